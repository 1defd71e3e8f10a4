//! Output validation against the annotated schema.
//!
//! Annotation keys are unknown keywords to JSON Schema and are ignored by the
//! validator, so the same document validates the composed object.

use jsonschema::{error::ValidationErrorKind, Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending field (`""` for the root).
    pub path: String,
    pub error: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("schema does not compile: {0}")]
pub struct SchemaCompileError(pub String);

pub struct OutputValidator {
    compiled: JSONSchema,
}

impl OutputValidator {
    pub fn new(schema: &Value) -> Result<Self, SchemaCompileError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| SchemaCompileError(e.to_string()))?;
        Ok(Self { compiled })
    }

    /// Validate a composed object; empty on success.
    pub fn validate(&self, instance: &Value) -> Vec<ValidationIssue> {
        let errors = match self.compiled.validate(instance) {
            Ok(()) => return Vec::new(),
            Err(errors) => errors,
        };
        let mut issues: Vec<ValidationIssue> = Vec::new();
        for err in errors {
            let mut segments: Vec<String> = err
                .instance_path
                .to_string()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            let hint = match &err.kind {
                ValidationErrorKind::Required { property } => {
                    if let Some(p) = property.as_str() {
                        segments.push(p.to_string());
                    }
                    Some("missing required field".to_string())
                }
                ValidationErrorKind::Type { .. } => Some("mismatched type".to_string()),
                ValidationErrorKind::Enum { .. } => Some("value not in allowed set".to_string()),
                _ => None,
            };
            issues.push(ValidationIssue { path: segments.join("."), error: err.to_string(), hint });
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reports_missing_required_paths() {
        let schema = json!({
            "type": "object",
            "required": ["name", "spec"],
            "properties": {
                "name": { "type": "string", "resourceKind": "cluster", "path": ["metadata", "name"] },
                "spec": {
                    "type": "object",
                    "required": ["replicas"],
                    "properties": { "replicas": { "type": "integer", "resourceKind": "cluster" } }
                }
            }
        });
        let v = OutputValidator::new(&schema).unwrap();
        assert!(v.validate(&json!({ "name": "db", "spec": { "replicas": 3 } })).is_empty());

        let issues = v.validate(&json!({ "spec": {} }));
        let mut paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["name", "spec.replicas"]);
        assert!(issues.iter().all(|i| i.hint.as_deref() == Some("missing required field")));
    }

    #[test]
    fn reports_type_mismatches() {
        let schema = json!({ "type": "object", "properties": { "cpu": { "type": "number" } } });
        let v = OutputValidator::new(&schema).unwrap();
        let issues = v.validate(&json!({ "cpu": "500m" }));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "cpu");
        assert_eq!(issues[0].hint.as_deref(), Some("mismatched type"));
    }
}
