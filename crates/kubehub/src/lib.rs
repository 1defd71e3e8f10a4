//! Bridge kubehub: backing-store clients for the composer.
//!
//! `KubeClient` talks to a live cluster through the dynamic object API;
//! `MemoryClient` serves fixtures in-process.

#![forbid(unsafe_code)]

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bridge_core::{ClientError, Resource, ResourceClient};
use kube::{
    api::{Api, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    discovery::{Discovery, Scope},
    Client, Config,
};
use metrics::{counter, histogram};
use tracing::{debug, info};

pub mod config;
pub mod memory;

pub use config::{parse_gvk_key, BridgeConfig, KindRegistry};
pub use memory::MemoryClient;

/// Dynamic-object client over the Kubernetes API.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
    kinds: KindRegistry,
}

impl KubeClient {
    pub fn new(client: Client, kinds: KindRegistry) -> Self { Self { client, kinds } }

    /// Client from the ambient kubeconfig / in-cluster environment.
    pub async fn try_default(kinds: KindRegistry) -> Result<Self> {
        let client = Client::try_default().await.context("building default kube client")?;
        Ok(Self::new(client, kinds))
    }

    /// Client from an explicit kubeconfig document (the caller's connection blob).
    pub async fn from_kubeconfig_yaml(yaml: &str, kinds: KindRegistry) -> Result<Self> {
        let kc = Kubeconfig::from_yaml(yaml).context("parsing kubeconfig")?;
        let cfg = Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
            .await
            .context("loading kubeconfig")?;
        let client = Client::try_from(cfg).context("building kube client")?;
        info!("kube client built from supplied kubeconfig");
        Ok(Self::new(client, kinds))
    }

    pub fn kinds(&self) -> &KindRegistry { &self.kinds }

    async fn api(&self, kind: &str, namespace: &str) -> Result<Api<DynamicObject>, ClientError> {
        let gvk = self.kinds.resolve(kind).ok_or_else(|| ClientError::UnknownKind(kind.to_string()))?;
        let (ar, namespaced) = find_api_resource(self.client.clone(), &gvk).await?;
        let api = if namespaced {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        };
        Ok(api)
    }
}

/// Scan served resources of the kind's API group for its `ApiResource`.
async fn find_api_resource(client: Client, gvk: &GroupVersionKind) -> Result<(ApiResource, bool), ClientError> {
    let discovery = Discovery::new(client).filter(&[gvk.group.as_str()]).run().await.map_err(backend)?;
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if ar.group == gvk.group && ar.version == gvk.version && ar.kind == gvk.kind {
                let namespaced = matches!(caps.scope, Scope::Namespaced);
                return Ok((ar, namespaced));
            }
        }
    }
    Err(ClientError::UnknownKind(format!("{}/{}/{} is not served", gvk.group, gvk.version, gvk.kind)))
}

fn backend(e: kube::Error) -> ClientError { ClientError::Backend(e.to_string()) }

fn strip_managed_fields(v: &mut serde_json::Value) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

fn to_resource(obj: &DynamicObject) -> Result<Resource, ClientError> {
    let mut raw = serde_json::to_value(obj).map_err(|e| ClientError::Backend(format!("serializing DynamicObject: {}", e)))?;
    strip_managed_fields(&mut raw);
    Ok(raw)
}

#[async_trait]
impl ResourceClient for KubeClient {
    async fn list(&self, kind: &str, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Resource>, ClientError> {
        let t0 = Instant::now();
        let api = self.api(kind, namespace).await?;
        let mut lp = ListParams::default();
        if let Some(sel) = label_selector {
            lp = lp.labels(sel);
        }
        let list = api.list(&lp).await.map_err(backend)?;
        let out = list.items.iter().map(to_resource).collect::<Result<Vec<_>, _>>()?;
        histogram!("kubehub_list_ms", t0.elapsed().as_secs_f64() * 1000.0);
        counter!("kubehub_list_total", 1u64);
        debug!(kind, ns = %namespace, selector = ?label_selector, items = out.len(), "list ok");
        Ok(out)
    }

    async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Resource, ClientError> {
        let t0 = Instant::now();
        let api = self.api(kind, namespace).await?;
        let obj = match api.get(name).await {
            Ok(o) => o,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                return Err(ClientError::NotFound { kind: kind.to_string(), name: name.to_string() })
            }
            Err(e) => return Err(backend(e)),
        };
        histogram!("kubehub_get_ms", t0.elapsed().as_secs_f64() * 1000.0);
        counter!("kubehub_get_total", 1u64);
        debug!(kind, ns = %namespace, name, "get ok");
        to_resource(&obj)
    }
}
