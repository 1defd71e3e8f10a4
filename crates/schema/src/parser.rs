//! Descriptor parser.
//!
//! Each `properties` entry doubles as schema metadata and provenance: the
//! JSON-Schema structural keys are stripped and whatever remains is read as
//! the field's annotation (`resourceKind`/`path`/`label`/`namePattern`, or a
//! `resources` list, plus an optional `transform`).

use bridge_core::{FieldDescriptor, ParseError, ResourceReference, Transform};
use serde_json::{Map, Value};
use tracing::trace;

/// Keys owned by JSON Schema; never part of an annotation.
pub const STRUCTURAL_KEYS: &[&str] = &[
    "type", "properties", "items", "required", "enum", "anyOf", "oneOf", "allOf", "not",
    "default", "description", "title", "format", "pattern", "minimum", "maximum",
    "exclusiveMinimum", "exclusiveMaximum", "minItems", "maxItems", "minLength", "maxLength",
    "additionalProperties", "nullable", "const", "examples", "$ref", "$schema", "$id",
];

const RESOURCES_KEY: &str = "resources";
const TRANSFORM_KEY: &str = "transform";
const KIND_KEY: &str = "resourceKind";

/// Parse an annotated schema into a descriptor forest (top-level fields in declaration order).
pub fn parse(schema: &Value) -> Result<Vec<FieldDescriptor>, ParseError> {
    let props = schema.get("properties").and_then(Value::as_object).ok_or(ParseError::NotAnObject)?;
    let required = required_names(schema);
    parse_properties(props, &required, &[], None)
}

fn required_names(node: &Value) -> Vec<String> {
    node.get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// JSON Schema allows `type: ["string", "null"]`; the first non-null entry wins.
fn node_type(node: &Map<String, Value>) -> Option<&str> {
    match node.get("type")? {
        Value::String(s) => Some(s.as_str()),
        Value::Array(a) => a.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    }
}

fn parse_properties(
    props: &Map<String, Value>,
    required: &[String],
    base: &[String],
    scope: Option<&ResourceReference>,
) -> Result<Vec<FieldDescriptor>, ParseError> {
    let mut out = Vec::with_capacity(props.len());
    for (name, node) in props {
        let mut field_path = base.to_vec();
        field_path.push(name.clone());
        let is_required = required.iter().any(|r| r == name);
        out.push(parse_field(node, field_path, is_required, scope)?);
    }
    Ok(out)
}

fn parse_field(
    node: &Value,
    field_path: Vec<String>,
    required: bool,
    scope: Option<&ResourceReference>,
) -> Result<FieldDescriptor, ParseError> {
    let dotted = field_path.join(".");
    let obj = node.as_object().ok_or_else(|| ParseError::InvalidNode { field: dotted.clone() })?;
    let (mut references, transform) = annotation(obj, &dotted)?;
    if let Some(parent) = scope {
        for r in references.iter_mut() {
            inherit_scope(r, parent);
        }
    }
    // Children resolve against this field's first reference, else whatever scope we inherited.
    let child_scope = references.iter().find(|r| !r.is_context()).or(scope);

    let mut nested = Vec::new();
    let mut is_array = false;
    match node_type(obj) {
        Some("object") => {
            if let Some(props) = obj.get("properties").and_then(Value::as_object) {
                nested = parse_properties(props, &required_names(node), &field_path, child_scope)?;
            }
        }
        Some("array") => {
            is_array = true;
            let items = obj.get("items").ok_or_else(|| ParseError::ArrayWithoutItems { field: dotted.clone() })?;
            let items_obj = items.as_object().ok_or_else(|| ParseError::ArrayWithoutItems { field: dotted.clone() })?;
            if node_type(items_obj) == Some("object") {
                if let Some(props) = items_obj.get("properties").and_then(Value::as_object) {
                    nested = parse_properties(props, &required_names(items), &field_path, child_scope)?;
                }
            }
        }
        _ => {}
    }

    if references.is_empty() && transform.is_none() && nested.is_empty() {
        trace!(field = %dotted, "no resource metadata; context-only field");
    }
    Ok(FieldDescriptor { field_path, references, transform, nested, is_array, required })
}

/// A nested reference to the enclosing field's kind, with no addressing of its
/// own, is served by the enclosing reference's locator.
fn inherit_scope(r: &mut ResourceReference, parent: &ResourceReference) {
    if r.is_context() || r.resource_kind != parent.resource_kind {
        return;
    }
    if r.label.is_none() && r.name_pattern.is_none() {
        r.label = parent.label.clone();
        r.name_pattern = parent.name_pattern.clone();
    }
}

fn annotation(obj: &Map<String, Value>, field: &str) -> Result<(Vec<ResourceReference>, Option<Transform>), ParseError> {
    let mut residual: Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| !STRUCTURAL_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let transform = match residual.remove(TRANSFORM_KEY) {
        Some(raw) => Some(serde_json::from_value::<Transform>(raw).map_err(|e| ParseError::InvalidTransform {
            field: field.to_string(),
            message: e.to_string(),
        })?),
        None => None,
    };

    let invalid = |e: serde_json::Error| ParseError::InvalidAnnotation { field: field.to_string(), message: e.to_string() };
    let references = if let Some(list) = residual.remove(RESOURCES_KEY) {
        serde_json::from_value::<Vec<ResourceReference>>(list).map_err(invalid)?
    } else if residual.contains_key(KIND_KEY) {
        vec![serde_json::from_value::<ResourceReference>(Value::Object(residual)).map_err(invalid)?]
    } else {
        Vec::new()
    };
    Ok((references, transform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::{Derivation, PathSegment, Reformat};
    use serde_json::json;

    fn cluster_schema() -> Value {
        json!({
            "type": "object",
            "required": ["name", "status"],
            "properties": {
                "name": { "type": "string", "resourceKind": "cluster", "path": ["metadata", "name"] },
                "cpu": {
                    "type": "number",
                    "description": "millicores",
                    "resourceKind": "cluster",
                    "path": "spec.componentSpecs[0].resources.limits.cpu",
                    "transform": { "reformat": "cpu" }
                },
                "status": { "type": "string", "transform": { "derive": "operationalStatus" } },
                "connection": {
                    "type": "object",
                    "properties": {
                        "password": {
                            "type": "string",
                            "resources": [
                                { "resourceKind": "secret", "label": "app.kubernetes.io/instance={{targetName}}", "path": ["data", "password"] },
                                { "resourceKind": "secret", "path": ["data", "password"] }
                            ],
                            "transform": { "decode": "base64" }
                        }
                    }
                },
                "pods": {
                    "type": "array",
                    "resourceKind": "pod",
                    "label": "app.kubernetes.io/instance",
                    "items": {
                        "type": "object",
                        "required": ["name"],
                        "properties": {
                            "name": { "type": "string", "resourceKind": "pod", "path": ["metadata", "name"] },
                            "age": { "type": "string", "resourceKind": "pod", "path": ["metadata", "creationTimestamp"], "transform": { "reformat": "age" } }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn parses_references_transforms_and_required() {
        let fields = parse(&cluster_schema()).unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["name", "cpu", "status", "connection", "pods"]);

        let cpu = &fields[1];
        assert_eq!(cpu.references.len(), 1);
        assert_eq!(cpu.references[0].path.segments()[2], PathSegment::Index(0));
        assert_eq!(cpu.transform, Some(Transform::Reformat(Reformat::Cpu)));
        assert!(!cpu.required);

        let status = &fields[2];
        assert!(status.references.is_empty());
        assert!(status.required);
        assert_eq!(status.transform, Some(Transform::Derive(Derivation::OperationalStatus)));

        let password = &fields[3].nested[0];
        assert_eq!(password.field_path, vec!["connection", "password"]);
        assert_eq!(password.references.len(), 2);
    }

    #[test]
    fn array_items_recurse_and_inherit_parent_scope() {
        let fields = parse(&cluster_schema()).unwrap();
        let pods = &fields[4];
        assert!(pods.is_array);
        assert_eq!(pods.nested.len(), 2);
        let name = &pods.nested[0];
        assert!(name.required);
        assert_eq!(name.field_path, vec!["pods", "name"]);
        // same kind, no addressing of its own: takes the parent's label
        assert_eq!(name.references[0].label.as_deref(), Some("app.kubernetes.io/instance"));
    }

    #[test]
    fn parse_is_pure() {
        let schema = cluster_schema();
        assert_eq!(parse(&schema).unwrap(), parse(&schema).unwrap());
    }

    #[test]
    fn fields_without_metadata_yield_no_references() {
        let fields = parse(&json!({
            "type": "object",
            "properties": { "note": { "type": "string", "description": "free text", "x-order": 3 } }
        }))
        .unwrap();
        assert!(fields[0].references.is_empty());
        assert!(fields[0].is_computed());
    }

    #[test]
    fn malformed_metadata_is_a_parse_error() {
        let no_items = json!({ "type": "object", "properties": { "tags": { "type": "array", "resourceKind": "pod" } } });
        assert_eq!(parse(&no_items), Err(ParseError::ArrayWithoutItems { field: "tags".into() }));

        let bad_kind = json!({ "type": "object", "properties": { "x": { "type": "string", "resourceKind": 7 } } });
        assert!(matches!(parse(&bad_kind), Err(ParseError::InvalidAnnotation { .. })));

        let bad_transform = json!({ "type": "object", "properties": { "x": { "type": "string", "transform": "shout" } } });
        assert!(matches!(parse(&bad_transform), Err(ParseError::InvalidTransform { .. })));

        assert_eq!(parse(&json!({ "type": "string" })), Err(ParseError::NotAnObject));
    }

    #[test]
    fn scalar_arrays_fan_out_without_nested_shape() {
        let fields = parse(&json!({
            "type": "object",
            "properties": {
                "podNames": { "type": "array", "items": { "type": "string" }, "resourceKind": "pod", "label": "app=web", "path": ["metadata", "name"] }
            }
        }))
        .unwrap();
        assert!(fields[0].is_array);
        assert!(fields[0].nested.is_empty());
    }
}
