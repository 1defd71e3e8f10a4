//! In-process backing store for tests and offline demos.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use bridge_core::{ClientError, Resource, ResourceClient};

#[derive(Debug, Clone)]
struct Entry {
    kind: String,
    resource: Resource,
}

/// Fixture store keyed by kind; objects keep insertion order, which is the
/// order `list` returns them in.
#[derive(Debug, Default)]
pub struct MemoryClient {
    entries: Vec<Entry>,
    failing: BTreeSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MemoryClient {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, kind: &str, resource: Resource) -> Self {
        self.entries.push(Entry { kind: kind.to_ascii_lowercase(), resource });
        self
    }

    /// Every call for `kind` fails with a backend error.
    pub fn failing(mut self, kind: &str) -> Self {
        self.failing.insert(kind.to_ascii_lowercase());
        self
    }

    /// Calls made so far, e.g. `list secret app=web` or `get cluster db1`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut c) = self.calls.lock() {
            c.push(call);
        }
    }

    fn check(&self, kind: &str) -> Result<String, ClientError> {
        let kind = kind.to_ascii_lowercase();
        if self.failing.contains(&kind) {
            return Err(ClientError::Backend(format!("injected failure for {}", kind)));
        }
        Ok(kind)
    }

    fn in_namespace<'a>(&'a self, kind: &'a str, namespace: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.entries.iter().filter(move |e| e.kind == kind).map(|e| &e.resource).filter(move |r| {
            match r.get("metadata").and_then(|m| m.get("namespace")).and_then(|n| n.as_str()) {
                Some(ns) => ns == namespace,
                None => true,
            }
        })
    }
}

fn labels_of(r: &Resource) -> Option<&serde_json::Map<String, serde_json::Value>> {
    r.get("metadata")?.get("labels")?.as_object()
}

/// Equality-based selectors: `k=v`, `k==v`, `k!=v`, `k` (exists), `!k` (absent),
/// comma-separated and ANDed.
pub fn selector_matches(selector: &str, r: &Resource) -> bool {
    let labels = labels_of(r);
    let get = |k: &str| labels.and_then(|l| l.get(k)).and_then(|v| v.as_str());
    selector.split(',').map(str::trim).filter(|t| !t.is_empty()).all(|term| {
        if let Some((k, v)) = term.split_once("!=") {
            get(k.trim()) != Some(v.trim())
        } else if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
            get(k.trim()) == Some(v.trim())
        } else if let Some(k) = term.strip_prefix('!') {
            get(k.trim()).is_none()
        } else {
            get(term).is_some()
        }
    })
}

fn name_of(r: &Resource) -> Option<&str> {
    r.get("metadata")?.get("name")?.as_str()
}

#[async_trait]
impl ResourceClient for MemoryClient {
    async fn list(&self, kind: &str, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Resource>, ClientError> {
        self.record(match label_selector {
            Some(sel) => format!("list {} {}", kind, sel),
            None => format!("list {}", kind),
        });
        let kind = self.check(kind)?;
        let items: Vec<Resource> = self
            .in_namespace(&kind, namespace)
            .filter(|r| label_selector.map(|s| selector_matches(s, r)).unwrap_or(true))
            .cloned()
            .collect();
        Ok(items)
    }

    async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Resource, ClientError> {
        self.record(format!("get {} {}", kind, name));
        let kind = self.check(kind)?;
        let found = self.in_namespace(&kind, namespace).find(|r| name_of(r) == Some(name)).cloned();
        found.ok_or_else(|| ClientError::NotFound { kind, name: name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(name: &str, ns: &str, app: &str) -> Resource {
        json!({ "metadata": { "name": name, "namespace": ns, "labels": { "app": app, "tier": "backend" } } })
    }

    #[test]
    fn selectors_cover_equality_and_existence() {
        let p = pod("a", "ns", "web");
        assert!(selector_matches("app=web", &p));
        assert!(selector_matches("app==web,tier", &p));
        assert!(selector_matches("app!=api", &p));
        assert!(selector_matches("!zone", &p));
        assert!(!selector_matches("app=api", &p));
        assert!(!selector_matches("tier,!app", &p));
    }

    #[tokio::test]
    async fn list_filters_by_namespace_and_labels_in_insertion_order() {
        let c = MemoryClient::new()
            .with("pod", pod("b", "ns", "web"))
            .with("pod", pod("a", "ns", "web"))
            .with("pod", pod("c", "other", "web"))
            .with("Pod", pod("d", "ns", "api"));
        let got = c.list("pod", "ns", Some("app=web")).await.unwrap();
        let names: Vec<&str> = got.iter().filter_map(name_of).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(c.list("pod", "ns", None).await.unwrap().len(), 3);
        assert_eq!(c.calls(), vec!["list pod app=web", "list pod"]);
    }

    #[tokio::test]
    async fn get_reports_not_found_and_injected_failures() {
        let c = MemoryClient::new().with("pod", pod("a", "ns", "web")).failing("secret");
        assert!(c.get("pod", "ns", "a").await.is_ok());
        assert!(matches!(c.get("pod", "ns", "zz").await, Err(ClientError::NotFound { .. })));
        assert!(matches!(c.list("secret", "ns", None).await, Err(ClientError::Backend(_))));
    }
}
