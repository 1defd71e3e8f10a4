//! Resource fetching: execute a plan against the backing store, every locator
//! concurrently. A failed locator records its error and never aborts the rest.

use std::time::Instant;

use bridge_core::{FetchError, FetchLocator, LocatorKey, Resource, ResourceClient, ResolutionContext};
use futures::future::join_all;
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::names::interpolate;

/// Fetched sets keyed by locator, in backing-store order.
pub type ResourceBag = FxHashMap<LocatorKey, Result<Vec<Resource>, FetchError>>;

pub async fn fetch(client: &dyn ResourceClient, locators: &[FetchLocator], ctx: &ResolutionContext) -> ResourceBag {
    let t0 = Instant::now();
    let results = join_all(locators.iter().map(|loc| async move { (loc.key(), fetch_one(client, loc, ctx).await) })).await;
    histogram!("bridge_fetch_ms", t0.elapsed().as_secs_f64() * 1000.0);
    results.into_iter().collect()
}

async fn fetch_one(client: &dyn ResourceClient, loc: &FetchLocator, ctx: &ResolutionContext) -> Result<Vec<Resource>, FetchError> {
    let kind = loc.resource_kind.as_str();
    counter!("bridge_fetch_total", 1u64, "kind" => kind.to_string());
    let res = match loc.label.as_deref() {
        Some(label) => {
            let selector = interpolate(label, ctx, false)
                .map_err(|source| FetchError::Selector { kind: kind.to_string(), source })?;
            client.list(kind, &ctx.namespace, Some(&selector)).await
        }
        // Unlabeled but name-filtered: the pattern needs the whole namespace to match against.
        None if !loc.name_patterns.is_empty() => client.list(kind, &ctx.namespace, None).await,
        None => client.get(kind, &ctx.namespace, &ctx.target_name).await.map(|r| vec![r]),
    };
    match res {
        Ok(items) => {
            debug!(kind, label = ?loc.label, items = items.len(), "locator fetched");
            Ok(items)
        }
        Err(source) => {
            counter!("bridge_fetch_errors_total", 1u64, "kind" => kind.to_string());
            warn!(kind, label = ?loc.label, error = %source, "locator fetch failed");
            Err(FetchError::Client { kind: kind.to_string(), source })
        }
    }
}
