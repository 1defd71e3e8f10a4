//! Transform pipeline: decode, reformat and derive field values after extraction.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_core::{Decoding, Derivation, FieldDescriptor, Reformat, Transform, TransformError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inputs shared by every transform in one object.
pub struct TransformContext<'a> {
    pub now: DateTime<Utc>,
    /// Raw (pre-transform) values of the fields next to the one being transformed.
    pub siblings: &'a Map<String, Value>,
}

/// Apply a field's transform. Fan-out arrays are transformed per item unless
/// the transform aggregates.
pub fn apply_field(field: &FieldDescriptor, raw: Value, cx: &TransformContext<'_>) -> Result<Value, TransformError> {
    let Some(t) = field.transform.as_ref() else { return Ok(raw) };
    match raw {
        Value::Array(items) if field.is_array && !t.is_aggregate() => {
            // positional gaps stay null
            items
                .into_iter()
                .map(|item| if item.is_null() { Ok(Value::Null) } else { transform(t, item, cx) })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        other => transform(t, other, cx),
    }
}

pub fn transform(t: &Transform, raw: Value, cx: &TransformContext<'_>) -> Result<Value, TransformError> {
    match t {
        Transform::Decode(d) => decode(*d, raw),
        Transform::Reformat(r) => reformat(*r, raw, cx.now),
        Transform::Derive(Derivation::OperationalStatus) => {
            let status = ReplicaSnapshot::from_raw(&raw, cx.siblings).status();
            Ok(Value::String(status.as_str().to_string()))
        }
        Transform::Derive(Derivation::Count) => Ok(Value::from(match &raw {
            Value::Array(a) => a.len(),
            Value::Null => 0,
            _ => 1,
        })),
    }
}

// ---- decoding ----

fn decode(d: Decoding, raw: Value) -> Result<Value, TransformError> {
    let name = Transform::Decode(d).name();
    match raw {
        Value::String(s) => decode_str(d, &s, name),
        // A whole `data` map decodes value by value.
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => decode_str(d, &s, name).map(|v| (k, v)),
                _ => Err(TransformError::Unexpected { transform: name, expected: "map of base64 strings" }),
            })
            .collect::<Result<Map<_, _>, _>>()
            .map(Value::Object),
        _ => Err(TransformError::Unexpected { transform: name, expected: "base64 string" }),
    }
}

fn decode_str(d: Decoding, s: &str, name: &'static str) -> Result<Value, TransformError> {
    let bytes = STANDARD.decode(s.trim()).map_err(|e| TransformError::Invalid { transform: name, message: e.to_string() })?;
    let text = String::from_utf8(bytes).map_err(|e| TransformError::Invalid { transform: name, message: e.to_string() })?;
    match d {
        Decoding::Base64 => Ok(Value::String(text)),
        Decoding::Base64Json => serde_json::from_str(&text).map_err(|e| TransformError::Invalid { transform: name, message: e.to_string() }),
    }
}

// ---- reformatting ----

fn reformat(r: Reformat, raw: Value, now: DateTime<Utc>) -> Result<Value, TransformError> {
    let name = Transform::Reformat(r).name();
    match r {
        Reformat::Cpu => Ok(number(quantity(&raw, name)? * 1000.0)),
        Reformat::Memory => Ok(number(quantity(&raw, name)? / MIB)),
        Reformat::Storage => Ok(number(quantity(&raw, name)? / GIB)),
        Reformat::Age => {
            let s = raw.as_str().ok_or(TransformError::Unexpected { transform: name, expected: "RFC 3339 timestamp" })?;
            let ts = DateTime::parse_from_rfc3339(s).map_err(|e| TransformError::Invalid { transform: name, message: e.to_string() })?;
            Ok(Value::String(relative_age(now.signed_duration_since(ts.with_timezone(&Utc)).num_seconds())))
        }
        Reformat::RuntimeName => {
            let s = raw.as_str().ok_or(TransformError::Unexpected { transform: name, expected: "image reference" })?;
            Ok(Value::String(runtime_name(s)))
        }
        Reformat::Number => match raw {
            Value::Number(_) => Ok(raw),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(number)
                .map_err(|e| TransformError::Invalid { transform: name, message: e.to_string() }),
            _ => Err(TransformError::Unexpected { transform: name, expected: "numeric string" }),
        },
        Reformat::String => match raw {
            Value::String(_) => Ok(raw),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(TransformError::Unexpected { transform: name, expected: "scalar" }),
        },
    }
}

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Rounded to micro-units; whole numbers serialize as integers.
fn number(v: f64) -> Value {
    let v = (v * 1e6).round() / 1e6;
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Value::from(v as i64)
    } else {
        serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn quantity(raw: &Value, name: &'static str) -> Result<f64, TransformError> {
    match raw {
        Value::Number(n) => n.as_f64().ok_or(TransformError::Unexpected { transform: name, expected: "quantity" }),
        Value::String(s) => parse_quantity(s).map_err(|message| TransformError::Invalid { transform: name, message }),
        _ => Err(TransformError::Unexpected { transform: name, expected: "quantity" }),
    }
}

/// Kubernetes resource quantity in base units (cores, bytes).
pub fn parse_quantity(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let split = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || ((*c == '+' || *c == '-') && *i == 0)))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (num, suffix) = s.split_at(split);
    let base: f64 = num.parse().map_err(|_| format!("invalid quantity: {:?}", s))?;
    let mult = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => KIB,
        "Mi" => MIB,
        "Gi" => GIB,
        "Ti" => GIB * KIB,
        "Pi" => GIB * MIB,
        "Ei" => GIB * GIB,
        exp if exp.starts_with(['e', 'E']) => {
            let e: i32 = exp[1..].parse().map_err(|_| format!("invalid quantity exponent: {:?}", s))?;
            10f64.powi(e)
        }
        other => return Err(format!("unknown quantity suffix {:?} in {:?}", other, s)),
    };
    Ok(base * mult)
}

/// kubectl-style age: `45s`, `12m`, `5h`, `3d`. Future timestamps read as `0s`.
pub fn relative_age(secs: i64) -> String {
    let secs = secs.max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

/// `ghcr.io/labring/devbox/go-1.22.5:13aacd8` → `go`.
pub fn runtime_name(image: &str) -> String {
    let last = image.rsplit('/').next().unwrap_or(image);
    let last = last.split('@').next().unwrap_or(last);
    let last = last.split(':').next().unwrap_or(last);
    match last.rsplit_once('-') {
        Some((head, tail)) if !head.is_empty() && tail.chars().next().is_some_and(|c| c.is_ascii_digit()) => head.to_string(),
        _ => last.to_string(),
    }
}

// ---- derivation ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationalStatus {
    Running,
    Pending,
    Stopped,
    Error,
    Unknown,
}

impl OperationalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationalStatus::Running => "Running",
            OperationalStatus::Pending => "Pending",
            OperationalStatus::Stopped => "Stopped",
            OperationalStatus::Error => "Error",
            OperationalStatus::Unknown => "Unknown",
        }
    }
}

/// Point-in-time replica counts of a workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicaSnapshot {
    pub replicas: i64,
    pub ready_replicas: i64,
    pub unavailable_replicas: i64,
    pub available_replicas: i64,
    pub paused: bool,
}

impl ReplicaSnapshot {
    /// First match wins: paused, nothing ready, something unavailable, all ready.
    pub fn status(&self) -> OperationalStatus {
        if self.paused {
            OperationalStatus::Stopped
        } else if self.ready_replicas == 0 && self.replicas > 0 {
            OperationalStatus::Pending
        } else if self.unavailable_replicas > 0 {
            OperationalStatus::Error
        } else if self.ready_replicas == self.replicas && self.replicas > 0 {
            OperationalStatus::Running
        } else {
            OperationalStatus::Unknown
        }
    }

    /// Read counts from a whole workload (`spec`/`status`), a flat object, or,
    /// key by key, from sibling raw values.
    pub fn from_raw(raw: &Value, siblings: &Map<String, Value>) -> Self {
        let count = |section: &str, key: &str| lookup(raw, siblings, section, key).and_then(as_i64).unwrap_or(0);
        Self {
            replicas: count("spec", "replicas"),
            ready_replicas: count("status", "readyReplicas"),
            unavailable_replicas: count("status", "unavailableReplicas"),
            available_replicas: count("status", "availableReplicas"),
            paused: lookup(raw, siblings, "spec", "paused").map(as_bool).unwrap_or(false),
        }
    }
}

fn lookup<'a>(raw: &'a Value, siblings: &'a Map<String, Value>, section: &str, key: &str) -> Option<&'a Value> {
    raw.get(section)
        .and_then(|s| s.get(key))
        .or_else(|| raw.get(key))
        .or_else(|| siblings.get(key))
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cx(siblings: &Map<String, Value>) -> TransformContext<'_> {
        TransformContext { now: DateTime::parse_from_rfc3339("2024-05-10T12:00:00Z").unwrap().with_timezone(&Utc), siblings }
    }

    fn status_of(v: Value) -> OperationalStatus {
        ReplicaSnapshot::from_raw(&v, &Map::new()).status()
    }

    #[test]
    fn status_precedence() {
        assert_eq!(status_of(json!({"replicas": 3, "readyReplicas": 0, "unavailableReplicas": 0, "paused": false})), OperationalStatus::Pending);
        assert_eq!(status_of(json!({"replicas": 3, "readyReplicas": 3, "unavailableReplicas": 0, "paused": false})), OperationalStatus::Running);
        assert_eq!(status_of(json!({"replicas": 3, "readyReplicas": 2, "unavailableReplicas": 1, "paused": false})), OperationalStatus::Error);
        assert_eq!(status_of(json!({"replicas": 3, "readyReplicas": 3, "unavailableReplicas": 0, "paused": true})), OperationalStatus::Stopped);
        assert_eq!(status_of(json!({"replicas": 3, "readyReplicas": 0, "unavailableReplicas": 3, "paused": true})), OperationalStatus::Stopped);
        assert_eq!(status_of(json!({"replicas": 0})), OperationalStatus::Unknown);
        assert_eq!(status_of(json!({"replicas": 3, "readyReplicas": 2})), OperationalStatus::Unknown);
    }

    #[test]
    fn status_reads_workloads_and_siblings() {
        let deploy = json!({
            "spec": { "replicas": 2, "paused": false },
            "status": { "readyReplicas": 2, "availableReplicas": 2 }
        });
        assert_eq!(status_of(deploy), OperationalStatus::Running);

        let mut siblings = Map::new();
        siblings.insert("replicas".into(), json!(1));
        siblings.insert("readyReplicas".into(), json!(0));
        let t = Transform::Derive(Derivation::OperationalStatus);
        assert_eq!(transform(&t, Value::Null, &cx(&siblings)).unwrap(), json!("Pending"));
    }

    #[test]
    fn quantities_normalize_to_plain_units() {
        let none = Map::new();
        let cpu = Transform::Reformat(Reformat::Cpu);
        assert_eq!(transform(&cpu, json!("500m"), &cx(&none)).unwrap(), json!(500));
        assert_eq!(transform(&cpu, json!("2"), &cx(&none)).unwrap(), json!(2000));
        assert_eq!(transform(&cpu, json!(1.5), &cx(&none)).unwrap(), json!(1500));
        let mem = Transform::Reformat(Reformat::Memory);
        assert_eq!(transform(&mem, json!("2Gi"), &cx(&none)).unwrap(), json!(2048));
        assert_eq!(transform(&mem, json!("512Mi"), &cx(&none)).unwrap(), json!(512));
        let storage = Transform::Reformat(Reformat::Storage);
        assert_eq!(transform(&storage, json!("10Gi"), &cx(&none)).unwrap(), json!(10));
        assert!(transform(&mem, json!("2Qi"), &cx(&none)).is_err());
        assert_eq!(parse_quantity("1e3").unwrap(), 1000.0);
        assert_eq!(parse_quantity("1k").unwrap(), 1000.0);
    }

    #[test]
    fn decodes_secret_payloads() {
        let none = Map::new();
        let b64 = Transform::Decode(Decoding::Base64);
        assert_eq!(transform(&b64, json!("c2VjcmV0"), &cx(&none)).unwrap(), json!("secret"));
        assert_eq!(
            transform(&b64, json!({"username": "cm9vdA==", "password": "cHc="}), &cx(&none)).unwrap(),
            json!({"username": "root", "password": "pw"})
        );
        assert!(matches!(transform(&b64, json!("%%%"), &cx(&none)), Err(TransformError::Invalid { .. })));
        let as_json = Transform::Decode(Decoding::Base64Json);
        assert_eq!(transform(&as_json, json!("eyJhIjoxfQ=="), &cx(&none)).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn ages_and_runtime_names() {
        let none = Map::new();
        let age = Transform::Reformat(Reformat::Age);
        assert_eq!(transform(&age, json!("2024-05-07T11:00:00Z"), &cx(&none)).unwrap(), json!("3d"));
        assert_eq!(transform(&age, json!("2024-05-10T11:59:15Z"), &cx(&none)).unwrap(), json!("45s"));
        assert_eq!(transform(&age, json!("2024-05-10T07:00:00Z"), &cx(&none)).unwrap(), json!("5h"));
        assert!(transform(&age, json!("yesterday"), &cx(&none)).is_err());

        assert_eq!(runtime_name("ghcr.io/labring-actions/devbox/go-1.22.5:13aacd8"), "go");
        assert_eq!(runtime_name("registry:5000/ns/python-3.11:v1"), "python");
        assert_eq!(runtime_name("docker.io/library/node.js-18@sha256:abc"), "node.js");
        assert_eq!(runtime_name("nginx"), "nginx");
        assert_eq!(runtime_name("my-app:latest"), "my-app");
    }

    #[test]
    fn fan_out_arrays_transform_per_item_except_aggregates() {
        let none = Map::new();
        let mut field = FieldDescriptor {
            field_path: vec!["cpus".into()],
            references: vec![],
            transform: Some(Transform::Reformat(Reformat::Cpu)),
            nested: vec![],
            is_array: true,
            required: false,
        };
        assert_eq!(apply_field(&field, json!(["100m", "1"]), &cx(&none)).unwrap(), json!([100, 1000]));
        field.transform = Some(Transform::Derive(Derivation::Count));
        assert_eq!(apply_field(&field, json!(["100m", "1"]), &cx(&none)).unwrap(), json!(2));
    }
}
