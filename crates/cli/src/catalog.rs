//! Shipped schemas, addressable as `builtin:<name>`.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

pub const BUILTIN_PREFIX: &str = "builtin:";

const DATABASE: &str = include_str!("../schemas/database.json");
const DEVBOX: &str = include_str!("../schemas/devbox.json");
const BUCKET: &str = include_str!("../schemas/bucket.json");

pub fn builtin(name: &str) -> Option<&'static str> {
    match name {
        "database" => Some(DATABASE),
        "devbox" => Some(DEVBOX),
        "bucket" => Some(BUCKET),
        _ => None,
    }
}

pub fn names() -> &'static [&'static str] { &["database", "devbox", "bucket"] }

/// Resolve a schema argument: `builtin:<name>`, a `.yaml`/`.yml` file, or JSON.
pub fn load(arg: &str) -> Result<Value> {
    if let Some(name) = arg.strip_prefix(BUILTIN_PREFIX) {
        let text = builtin(name).ok_or_else(|| anyhow!("unknown builtin schema `{}` (have: {})", name, names().join(", ")))?;
        return serde_json::from_str(text).with_context(|| format!("builtin schema `{}`", name));
    }
    let path = Path::new(arg);
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display())),
        _ => serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_parses_and_plans() {
        for name in names() {
            let schema = load(&format!("builtin:{}", name)).unwrap();
            let fields = bridge_schema::parse(&schema).unwrap();
            assert!(!fields.is_empty(), "{name}");
            assert!(!bridge_compose::plan(&fields).is_empty(), "{name}");
            bridge_schema::OutputValidator::new(&schema).unwrap();
        }
    }

    #[test]
    fn database_plan_shares_locators() {
        let schema = load("builtin:database").unwrap();
        let plan = bridge_compose::plan(&bridge_schema::parse(&schema).unwrap());
        let kinds: Vec<&str> = plan.iter().map(|l| l.resource_kind.as_str()).collect();
        assert_eq!(kinds.iter().filter(|k| **k == "service").count(), 1);
        assert_eq!(kinds.iter().filter(|k| **k == "secret").count(), 1);
        assert!(kinds.contains(&"cluster"));
    }

    #[test]
    fn unknown_builtin_is_an_error() {
        let err = load("builtin:queue").unwrap_err();
        assert!(err.to_string().contains("unknown builtin schema"));
    }
}
