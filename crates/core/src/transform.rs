//! Per-field transform descriptors. Evaluation lives in the composer; these
//! are the closed families a schema may name.
//!
//! Annotated as `{"decode": "base64"}`, `{"reformat": "cpu"}`, `{"derive": "operationalStatus"}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transform {
    Decode(Decoding),
    Reformat(Reformat),
    Derive(Derivation),
}

/// Secret payload decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Decoding {
    /// Standard base64 to a UTF-8 string.
    Base64,
    /// Standard base64, then a JSON document.
    Base64Json,
}

/// Unit and presentation normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reformat {
    /// Resource quantity to millicores.
    Cpu,
    /// Resource quantity to MiB.
    Memory,
    /// Resource quantity to GiB.
    Storage,
    /// RFC 3339 timestamp to a relative age such as `3d`.
    Age,
    /// Image reference to a short runtime name.
    RuntimeName,
    Number,
    String,
}

/// Values computed from a raw snapshot and its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Derivation {
    OperationalStatus,
    Count,
}

impl Transform {
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Decode(Decoding::Base64) => "decode.base64",
            Transform::Decode(Decoding::Base64Json) => "decode.base64Json",
            Transform::Reformat(Reformat::Cpu) => "reformat.cpu",
            Transform::Reformat(Reformat::Memory) => "reformat.memory",
            Transform::Reformat(Reformat::Storage) => "reformat.storage",
            Transform::Reformat(Reformat::Age) => "reformat.age",
            Transform::Reformat(Reformat::RuntimeName) => "reformat.runtimeName",
            Transform::Reformat(Reformat::Number) => "reformat.number",
            Transform::Reformat(Reformat::String) => "reformat.string",
            Transform::Derive(Derivation::OperationalStatus) => "derive.operationalStatus",
            Transform::Derive(Derivation::Count) => "derive.count",
        }
    }

    /// Whether the transform consumes the whole (fan-out) value instead of each item.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Transform::Derive(Derivation::Count))
    }
}
