//! Bridge core types: provenance annotations, field descriptors, fetch locators
//! and the resolution context shared by every stage of a composition.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod client;
pub mod error;
pub mod path;
pub mod transform;

pub use client::ResourceClient;
pub use error::{
    ClientError, CompositionError, FetchError, FieldFailure, NameResolutionError, ParseError,
    TransformError,
};
pub use path::{PathSegment, ResourcePath};
pub use transform::{Decoding, Derivation, Reformat, Transform};

/// A raw backing resource: an arbitrary Kubernetes-like JSON document.
pub type Resource = serde_json::Value;

/// Reserved kind for caller-supplied side-channel data; never fetched.
pub const CONTEXT_KIND: &str = "context";

/// One provenance annotation attached to a schema field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReference {
    pub resource_kind: String,
    #[serde(default, skip_serializing_if = "ResourcePath::is_empty")]
    pub path: ResourcePath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
}

impl ResourceReference {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { resource_kind: kind.into(), path: ResourcePath::default(), label: None, name_pattern: None }
    }

    pub fn with_path(mut self, path: ResourcePath) -> Self { self.path = path; self }
    pub fn with_label(mut self, label: impl Into<String>) -> Self { self.label = Some(label.into()); self }
    pub fn with_name_pattern(mut self, pattern: impl Into<String>) -> Self { self.name_pattern = Some(pattern.into()); self }

    pub fn is_context(&self) -> bool { self.resource_kind == CONTEXT_KIND }

    /// Key of the locator that serves this reference.
    pub fn locator_key(&self) -> LocatorKey {
        LocatorKey { resource_kind: self.resource_kind.clone(), label: self.label.clone() }
    }
}

/// A schema field with its provenance and sub-shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    /// Position in the output tree, root first. Array items add no segment.
    pub field_path: Vec<String>,
    pub references: Vec<ResourceReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<FieldDescriptor>,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub required: bool,
}

impl FieldDescriptor {
    /// Output key of this field within its parent object.
    pub fn name(&self) -> &str {
        self.field_path.last().map(String::as_str).unwrap_or("")
    }

    pub fn dotted(&self) -> String { self.field_path.join(".") }

    /// Fields with neither references nor nested shape are computed (or context-only).
    pub fn is_computed(&self) -> bool { self.references.is_empty() && self.nested.is_empty() }
}

/// Depth-first, declaration-order walk over a descriptor forest.
pub fn walk(descriptors: &[FieldDescriptor]) -> Vec<&FieldDescriptor> {
    fn visit<'a>(list: &'a [FieldDescriptor], out: &mut Vec<&'a FieldDescriptor>) {
        for d in list {
            out.push(d);
            visit(&d.nested, out);
        }
    }
    let mut out = Vec::new();
    visit(descriptors, &mut out);
    out
}

/// Identity of a fetch: one backing call serves every reference with this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorKey {
    pub resource_kind: String,
    pub label: Option<String>,
}

/// Deduplicated unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchLocator {
    pub resource_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Post-filters applied to the fetched set; never sent to the backing store.
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub name_patterns: SmallVec<[String; 2]>,
}

impl FetchLocator {
    pub fn key(&self) -> LocatorKey {
        LocatorKey { resource_kind: self.resource_kind.clone(), label: self.label.clone() }
    }
}

/// Caller-supplied variables for one composition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionContext {
    /// Name of the domain object's own backing resource.
    pub target_name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    /// Opaque credential blob (e.g. kubeconfig); routed to the client by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
}

impl ResolutionContext {
    pub fn new(target_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { target_name: target_name.into(), namespace: namespace.into(), ..Default::default() }
    }

    pub fn with_instance(mut self, name: impl Into<String>) -> Self { self.instance_name = Some(name.into()); self }
    pub fn with_connection(mut self, blob: impl Into<String>) -> Self { self.connection = Some(blob.into()); self }
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Look up a variable by name; well-known names shadow free-form vars.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "targetName" => Some(self.target_name.as_str()),
            "namespace" => Some(self.namespace.as_str()),
            "instanceName" => self.instance_name.as_deref(),
            "connection" => self.connection.as_deref(),
            other => self.vars.get(other).map(String::as_str),
        }
    }
}

pub mod prelude {
    pub use super::{
        walk, FetchLocator, FieldDescriptor, LocatorKey, Resource, ResourceClient, ResourcePath,
        ResourceReference, ResolutionContext, Transform, CONTEXT_KIND,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_lookup_prefers_well_known_names() {
        let ctx = ResolutionContext::new("db1", "ns-a")
            .with_instance("proj1")
            .with_var("instanceName", "shadowed")
            .with_var("region", "eu");
        assert_eq!(ctx.get("targetName"), Some("db1"));
        assert_eq!(ctx.get("instanceName"), Some("proj1"));
        assert_eq!(ctx.get("region"), Some("eu"));
        assert_eq!(ctx.get("connection"), None);
    }

    #[test]
    fn reference_deserializes_from_annotation_keys() {
        let r: ResourceReference = serde_json::from_value(serde_json::json!({
            "resourceKind": "secret",
            "path": ["data", "password"],
            "label": "app.kubernetes.io/instance",
            "namePattern": "^{{targetName}}-conn$",
            "x-ui-hint": "ignored"
        }))
        .unwrap();
        assert_eq!(r.resource_kind, "secret");
        assert_eq!(r.path.len(), 2);
        assert_eq!(r.locator_key(), LocatorKey { resource_kind: "secret".into(), label: Some("app.kubernetes.io/instance".into()) });
    }

    #[test]
    fn walk_visits_nested_in_declaration_order() {
        let leaf = |p: &[&str]| FieldDescriptor {
            field_path: p.iter().map(|s| s.to_string()).collect(),
            references: vec![],
            transform: None,
            nested: vec![],
            is_array: false,
            required: false,
        };
        let mut parent = leaf(&["spec"]);
        parent.nested = vec![leaf(&["spec", "cpu"]), leaf(&["spec", "memory"])];
        let all = vec![leaf(&["name"]), parent];
        let names: Vec<String> = walk(&all).iter().map(|d| d.dotted()).collect();
        assert_eq!(names, vec!["name", "spec", "spec.cpu", "spec.memory"]);
    }
}
