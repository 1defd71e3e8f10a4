//! Kind aliases and runtime configuration.
//!
//! Schemas name backing kinds with short aliases (`secret`, `cluster`); the
//! registry maps them to group/version/kind keys (`v1/Secret`,
//! `apps.kubeblocks.io/v1alpha1/Cluster`).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const BUILTIN_KINDS: &[(&str, &str)] = &[
    ("pod", "v1/Pod"),
    ("secret", "v1/Secret"),
    ("service", "v1/Service"),
    ("configmap", "v1/ConfigMap"),
    ("pvc", "v1/PersistentVolumeClaim"),
    ("deployment", "apps/v1/Deployment"),
    ("statefulset", "apps/v1/StatefulSet"),
    ("ingress", "networking.k8s.io/v1/Ingress"),
    ("cluster", "apps.kubeblocks.io/v1alpha1/Cluster"),
    ("backup", "dataprotection.kubeblocks.io/v1alpha1/Backup"),
    ("devbox", "devbox.sealos.io/v1alpha1/Devbox"),
    ("objectstoragebucket", "objectstorage.sealos.io/v1/ObjectStorageBucket"),
    ("objectstorageuser", "objectstorage.sealos.io/v1/ObjectStorageUser"),
];

/// Parse "v1/Kind" or "group/v1/Kind".
pub fn parse_gvk_key(key: &str) -> Result<GroupVersionKind> {
    let parts: Vec<_> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] => Ok(GroupVersionKind { group: String::new(), version: version.to_string(), kind: kind.to_string() }),
        [group, version, kind] => Ok(GroupVersionKind { group: (*group).to_string(), version: (*version).to_string(), kind: (*kind).to_string() }),
        _ => Err(anyhow!("invalid gvk key: {} (expect v1/Kind or group/v1/Kind)", key)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindRegistry {
    aliases: BTreeMap<String, String>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        Self { aliases: BUILTIN_KINDS.iter().map(|(a, k)| (a.to_string(), k.to_string())).collect() }
    }
}

impl KindRegistry {
    pub fn empty() -> Self { Self { aliases: BTreeMap::new() } }

    pub fn insert(&mut self, alias: &str, gvk_key: &str) -> Result<()> {
        parse_gvk_key(gvk_key)?;
        self.aliases.insert(alias.to_ascii_lowercase(), gvk_key.to_string());
        Ok(())
    }

    /// Resolve an alias (case-insensitive); a full gvk key is accepted as-is.
    pub fn resolve(&self, kind: &str) -> Option<GroupVersionKind> {
        if let Some(key) = self.aliases.get(&kind.to_ascii_lowercase()) {
            return parse_gvk_key(key).ok();
        }
        if kind.contains('/') { parse_gvk_key(kind).ok() } else { None }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(a, k)| (a.as_str(), k.as_str()))
    }
}

/// Runtime configuration: file (YAML) first, then environment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default)]
    pub namespace: Option<String>,
    /// Extra or overriding aliases: `alias: group/version/Kind`.
    #[serde(default)]
    pub kinds: BTreeMap<String, String>,
}

impl BridgeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("parsing bridge config YAML")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text)
    }

    /// Load from `BRIDGE_KINDS` (path to YAML) if set, then apply `BRIDGE_NAMESPACE`.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var("BRIDGE_KINDS") {
            Ok(path) => {
                info!(path = %path, "loading kind registry");
                Self::from_file(Path::new(&path))?
            }
            Err(_) => Self::default(),
        };
        if let Ok(ns) = std::env::var("BRIDGE_NAMESPACE") {
            if !ns.is_empty() {
                cfg.namespace = Some(ns);
            }
        }
        Ok(cfg)
    }

    /// Built-in aliases overlaid with configured ones.
    pub fn registry(&self) -> Result<KindRegistry> {
        let mut reg = KindRegistry::default();
        for (alias, key) in self.kinds.iter() {
            reg.insert(alias, key).with_context(|| format!("kind alias `{}`", alias))?;
        }
        debug!(aliases = reg.aliases.len(), "kind registry ready");
        Ok(reg)
    }

    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_aliases_and_raw_keys() {
        let reg = KindRegistry::default();
        let gvk = reg.resolve("Secret").unwrap();
        assert_eq!((gvk.group.as_str(), gvk.version.as_str(), gvk.kind.as_str()), ("", "v1", "Secret"));
        let gvk = reg.resolve("cert-manager.io/v1/Certificate").unwrap();
        assert_eq!(gvk.group, "cert-manager.io");
        assert!(reg.resolve("widget").is_none());
    }

    #[test]
    fn config_overlays_builtin_kinds() {
        let cfg = BridgeConfig::from_yaml("namespace: ns-dev\nkinds:\n  cluster: apps.kubeblocks.io/v1/Cluster\n  widget: example.io/v1/Widget\n").unwrap();
        assert_eq!(cfg.namespace_or_default(), "ns-dev");
        let reg = cfg.registry().unwrap();
        assert_eq!(reg.resolve("cluster").unwrap().version, "v1");
        assert_eq!(reg.resolve("widget").unwrap().kind, "Widget");
        assert!(reg.resolve("pod").is_some());
    }

    #[test]
    fn invalid_alias_targets_are_rejected() {
        let cfg = BridgeConfig::from_yaml("kinds:\n  broken: Widget\n").unwrap();
        assert!(cfg.registry().is_err());
    }
}
