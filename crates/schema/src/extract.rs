//! Path extraction over raw resources.

use bridge_core::{PathSegment, ResourcePath};
use serde_json::Value;

/// Walk `path` through `root`. An empty path yields the root itself.
///
/// Key segments index objects; a key made of digits also indexes arrays, so
/// `["spec", "ports", "0", "port"]` and `spec.ports[0].port` agree.
pub fn extract<'a>(root: &'a Value, path: &ResourcePath) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path.segments() {
        cur = match (seg, cur) {
            (PathSegment::Key(k), Value::Object(map)) => map.get(k)?,
            (PathSegment::Key(k), Value::Array(arr)) => arr.get(k.parse::<usize>().ok()?)?,
            (PathSegment::Index(i), Value::Array(arr)) => arr.get(*i)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Owned variant; explicit JSON `null` counts as absent.
pub fn extract_owned(root: &Value, path: &ResourcePath) -> Option<Value> {
    extract(root, path).filter(|v| !v.is_null()).cloned()
}

/// Array fan-out: one extraction per resource, positionally aligned with
/// `resources`. A resource lacking the path contributes `null`.
pub fn fan_out<'a, I>(resources: I, path: &ResourcePath) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    resources
        .into_iter()
        .map(|r| extract(r, path).cloned().unwrap_or(Value::Null))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dotted(s: &str) -> ResourcePath { ResourcePath::parse_dotted(s).unwrap() }

    #[test]
    fn extracts_nested_values_and_indices() {
        let pod = json!({
            "metadata": { "name": "web-0", "labels": { "app.kubernetes.io/name": "web" } },
            "spec": { "containers": [ { "image": "nginx:1.25" }, { "image": "envoy:v1" } ] }
        });
        assert_eq!(extract(&pod, &dotted("spec.containers[1].image")), Some(&json!("envoy:v1")));
        assert_eq!(
            extract(&pod, &ResourcePath::keys(["metadata", "labels", "app.kubernetes.io/name"])),
            Some(&json!("web"))
        );
        assert_eq!(extract(&pod, &ResourcePath::keys(["spec", "containers", "0", "image"])), Some(&json!("nginx:1.25")));
        assert_eq!(extract(&pod, &dotted("spec.containers[5].image")), None);
        assert_eq!(extract(&pod, &dotted("metadata.name.first")), None);
        assert_eq!(extract(&pod, &ResourcePath::default()), Some(&pod));
    }

    #[test]
    fn fan_out_keeps_positions() {
        let a = json!({ "metadata": { "name": "a" } });
        let b = json!({ "status": {} });
        let c = json!({ "metadata": { "name": "c" } });
        let out = fan_out([&a, &b, &c], &dotted("metadata.name"));
        assert_eq!(out, vec![json!("a"), Value::Null, json!("c")]);
    }

    #[test]
    fn owned_extraction_treats_null_as_absent() {
        let v = json!({ "status": { "phase": null } });
        assert_eq!(extract_owned(&v, &dotted("status.phase")), None);
    }
}
