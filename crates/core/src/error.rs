//! Error taxonomy. Only `ParseError` and `CompositionError` reach callers;
//! the rest are localized to a single field and reported as diagnostics.

use serde::{Deserialize, Serialize};

/// Malformed descriptor metadata. Fatal.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("schema root must be an object with `properties`")]
    NotAnObject,
    #[error("{field}: schema node must be a JSON object")]
    InvalidNode { field: String },
    #[error("{field}: array field has no `items` shape")]
    ArrayWithoutItems { field: String },
    #[error("{field}: invalid resource annotation: {message}")]
    InvalidAnnotation { field: String, message: String },
    #[error("{field}: invalid transform: {message}")]
    InvalidTransform { field: String, message: String },
}

/// Failure reported by a backing-store client.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientError {
    #[error("not found: {kind}/{name}")]
    NotFound { kind: String, name: String },
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),
    #[error("backend: {0}")]
    Backend(String),
}

/// A pattern failed to interpolate or compile. Treated like a fetch failure.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NameResolutionError {
    #[error("pattern `{pattern}` references unknown variable `{variable}`")]
    UnknownVariable { pattern: String, variable: String },
    #[error("pattern `{pattern}` is not a valid regex: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// One locator's fetch failed. Non-fatal.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{kind}: {source}")]
    Client { kind: String, #[source] source: ClientError },
    #[error("{kind}: label selector: {source}")]
    Selector { kind: String, #[source] source: NameResolutionError },
}

/// A transform rejected its raw value. The field resolves to absent.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("{transform}: expected {expected}")]
    Unexpected { transform: &'static str, expected: &'static str },
    #[error("{transform}: {message}")]
    Invalid { transform: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFailure {
    /// Dotted output path of the failing field.
    pub path: String,
    pub message: String,
}

/// The assembled object does not satisfy the output schema. Fatal.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("composed object failed validation at: {}", summarize(.failures))]
pub struct CompositionError {
    pub failures: Vec<FieldFailure>,
}

impl CompositionError {
    pub fn paths(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.path.as_str()).collect()
    }
}

fn summarize(failures: &[FieldFailure]) -> String {
    failures.iter().map(|f| f.path.as_str()).collect::<Vec<_>>().join(", ")
}
