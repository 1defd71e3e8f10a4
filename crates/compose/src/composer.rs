//! Object composition: parse → plan → fetch → resolve names → extract →
//! transform → assemble → validate.

use std::sync::Arc;
use std::time::Instant;

use bridge_core::{
    CompositionError, FieldDescriptor, FieldFailure, ParseError, PathSegment, ResourceClient,
    ResourceReference, ResolutionContext, Transform,
};
use bridge_schema::{extract, extract_owned, fan_out, parse, OutputValidator, SchemaCompileError};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::fetcher::{fetch, ResourceBag};
use crate::names::{resolve_names, resource_name};
use crate::planner::plan;
use crate::transform::{apply_field, TransformContext};

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Schema(#[from] SchemaCompileError),
    #[error(transparent)]
    Composition(#[from] CompositionError),
    #[error("composed object does not deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),
}

/// Stage at which a single field failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Fetch,
    Name,
    Transform,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Name => "name",
            Stage::Transform => "transform",
        }
    }
}

/// A localized failure; the field was left out of the object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDiagnostic {
    pub field: String,
    pub stage: Stage,
    pub message: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Composition {
    pub object: Value,
    pub diagnostics: Vec<FieldDiagnostic>,
}

/// Composer bound to one backing-store client. Cheap to clone; every call
/// builds its own plan and resource bag.
#[derive(Clone)]
pub struct Composer {
    client: Arc<dyn ResourceClient>,
    now: Option<DateTime<Utc>>,
}

impl Composer {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self { Self { client, now: None } }

    /// Pin the clock used by relative-time transforms.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub async fn compose(&self, schema: &Value, ctx: &ResolutionContext) -> Result<Value, ComposeError> {
        Ok(self.compose_with_report(schema, ctx).await?.object)
    }

    pub async fn compose_with_report(&self, schema: &Value, ctx: &ResolutionContext) -> Result<Composition, ComposeError> {
        compose_report(self.client.as_ref(), schema, ctx, self.now.unwrap_or_else(Utc::now)).await
    }

    /// Compose and deserialize into a caller type.
    pub async fn compose_as<T: DeserializeOwned>(&self, schema: &Value, ctx: &ResolutionContext) -> Result<T, ComposeError> {
        let object = self.compose(schema, ctx).await?;
        Ok(serde_json::from_value(object)?)
    }
}

/// One-shot composition with an explicitly passed client.
pub async fn compose(client: &dyn ResourceClient, schema: &Value, ctx: &ResolutionContext) -> Result<Value, ComposeError> {
    Ok(compose_report(client, schema, ctx, Utc::now()).await?.object)
}

pub async fn compose_report(
    client: &dyn ResourceClient,
    schema: &Value,
    ctx: &ResolutionContext,
    now: DateTime<Utc>,
) -> Result<Composition, ComposeError> {
    let t0 = Instant::now();
    let descriptors = parse(schema)?;
    let validator = OutputValidator::new(schema)?;
    let locators = plan(&descriptors);
    debug!(target_name = %ctx.target_name, fields = descriptors.len(), locators = locators.len(), "fetch plan ready");

    let bag = fetch(client, &locators, ctx).await;

    let mut asm = Assembler { bag: &bag, ctx, now, diagnostics: Vec::new() };
    let object = Value::Object(asm.object(&descriptors, None));
    let diagnostics = asm.diagnostics;

    let issues = validator.validate(&object);
    histogram!("bridge_compose_ms", t0.elapsed().as_secs_f64() * 1000.0);
    if !issues.is_empty() {
        let failures: Vec<FieldFailure> = issues
            .into_iter()
            .map(|issue| {
                let message = match diagnostics.iter().find(|d| d.field == issue.path) {
                    Some(d) => format!("{} ({} failed: {})", issue.error, d.stage.as_str(), d.message),
                    None => issue.error,
                };
                FieldFailure { path: issue.path, message }
            })
            .collect();
        warn!(target_name = %ctx.target_name, failures = failures.len(), "composed object failed validation");
        return Err(CompositionError { failures }.into());
    }
    info!(
        target_name = %ctx.target_name,
        locators = locators.len(),
        degraded = diagnostics.len(),
        took_ms = %t0.elapsed().as_millis(),
        "composition ok"
    );
    Ok(Composition { object, diagnostics })
}

/// The resource (or value within it) that nested fields of the same locator read from.
#[derive(Clone, Copy)]
struct Scope<'b> {
    reference: &'b ResourceReference,
    /// `None` when the parent could not be resolved.
    value: Option<&'b Value>,
}

impl Scope<'_> {
    /// Inherited references carry the parent's kind, label and pattern verbatim.
    fn serves(&self, r: &ResourceReference) -> bool {
        let parent = self.reference;
        parent.resource_kind == r.resource_kind && parent.label == r.label && parent.name_pattern == r.name_pattern
    }
}

struct Assembler<'b> {
    bag: &'b ResourceBag,
    ctx: &'b ResolutionContext,
    now: DateTime<Utc>,
    diagnostics: Vec<FieldDiagnostic>,
}

impl<'b> Assembler<'b> {
    /// Bottom-up: gather every field's raw value first so derivations can see
    /// their siblings, then transform and insert.
    fn object(&mut self, fields: &'b [FieldDescriptor], scope: Option<Scope<'b>>) -> Map<String, Value> {
        let mut raws: Vec<Option<Value>> = Vec::with_capacity(fields.len());
        let mut siblings = Map::new();
        for field in fields {
            let raw = self.raw(field, scope);
            if let Some(v) = &raw {
                siblings.insert(field.name().to_string(), v.clone());
            }
            raws.push(raw);
        }

        let cx = TransformContext { now: self.now, siblings: &siblings };
        let mut out = Map::new();
        for (field, raw) in fields.iter().zip(raws) {
            let raw = match raw {
                Some(v) => v,
                // computed from siblings alone
                None if field.references.is_empty() && matches!(field.transform, Some(Transform::Derive(_))) => Value::Null,
                None => continue,
            };
            match apply_field(field, raw, &cx) {
                Ok(v) => {
                    out.insert(field.name().to_string(), v);
                }
                Err(e) => self.report(field, Stage::Transform, e.to_string()),
            }
        }
        out
    }

    fn raw(&mut self, field: &'b FieldDescriptor, scope: Option<Scope<'b>>) -> Option<Value> {
        // Aggregates like `count` see every matched resource, as fan-out does.
        if field.is_array || field.transform.is_some_and(|t| t.is_aggregate()) {
            return self.array(field, scope);
        }
        if !field.nested.is_empty() {
            // An unresolved parent only fails the children that read from it.
            let inner = match field.references.iter().find(|r| !r.is_context()) {
                Some(r) => Some(self.scope_for(field, r, scope).unwrap_or(Scope { reference: r, value: None })),
                None => scope,
            };
            let obj = self.object(&field.nested, inner);
            return if obj.is_empty() { None } else { Some(Value::Object(obj)) };
        }
        // Several references: first non-empty extraction in declaration order.
        for r in field.references.iter() {
            if let Some(v) = self.single(field, r, scope) {
                if !is_empty(&v) {
                    return Some(v);
                }
            }
        }
        None
    }

    fn single(&mut self, field: &'b FieldDescriptor, r: &'b ResourceReference, scope: Option<Scope<'b>>) -> Option<Value> {
        if r.is_context() {
            return self.context_value(r);
        }
        let hits = self.matched(field, r, scope)?;
        match hits.first() {
            Some(first) => extract_owned(first, &r.path),
            None => {
                self.report(field, Stage::Fetch, format!("no {} matched", r.resource_kind));
                None
            }
        }
    }

    /// Fan-out: exactly one item per matched resource, in list order. A
    /// resource missing the path yields `null` (scalar) or `{}` (nested).
    fn array(&mut self, field: &'b FieldDescriptor, scope: Option<Scope<'b>>) -> Option<Value> {
        for r in field.references.iter() {
            if r.is_context() {
                if let Some(v) = self.context_value(r) {
                    return Some(Value::Array(vec![v]));
                }
                continue;
            }
            let Some(hits) = self.matched(field, r, scope) else { continue };
            let mut items = Vec::with_capacity(hits.len());
            if field.nested.is_empty() {
                items.extend(fan_out(hits.iter().copied(), &r.path));
            } else {
                for res in hits {
                    let item = match extract(res, &r.path) {
                        Some(value) if !value.is_null() => self.object(&field.nested, Some(Scope { reference: r, value: Some(value) })),
                        _ => Map::new(),
                    };
                    items.push(Value::Object(item));
                }
            }
            return Some(Value::Array(items));
        }
        None
    }

    fn scope_for(&mut self, field: &'b FieldDescriptor, r: &'b ResourceReference, scope: Option<Scope<'b>>) -> Option<Scope<'b>> {
        let hits = self.matched(field, r, scope)?;
        let Some(&first) = hits.first() else {
            self.report(field, Stage::Fetch, format!("no {} matched", r.resource_kind));
            return None;
        };
        match extract(first, &r.path) {
            Some(value) if !value.is_null() => Some(Scope { reference: r, value: Some(value) }),
            _ => {
                self.report(field, Stage::Fetch, format!("{} has no value at `{}`", r.resource_kind, r.path));
                None
            }
        }
    }

    /// Resources a reference addresses, after name resolution.
    fn matched(&mut self, field: &FieldDescriptor, r: &ResourceReference, scope: Option<Scope<'b>>) -> Option<Vec<&'b Value>> {
        if let Some(s) = scope {
            if s.serves(r) {
                return Some(s.value.into_iter().collect());
            }
        }
        let bag: &'b ResourceBag = self.bag;
        let list = match bag.get(&r.locator_key()) {
            Some(Ok(list)) => list,
            Some(Err(e)) => {
                self.report(field, Stage::Fetch, e.to_string());
                return None;
            }
            None => {
                self.report(field, Stage::Fetch, format!("no locator planned for {}", r.resource_kind));
                return None;
            }
        };
        if r.name_pattern.is_some() {
            return match resolve_names(list, r.name_pattern.as_deref(), self.ctx) {
                Ok(hits) => Some(hits),
                Err(e) => {
                    self.report(field, Stage::Name, e.to_string());
                    None
                }
            };
        }
        if r.label.is_none() {
            // direct name: the domain object's own resource
            let target = self.ctx.target_name.as_str();
            return Some(list.iter().filter(|x| resource_name(x) == Some(target)).collect());
        }
        Some(list.iter().collect())
    }

    /// `context` references read caller variables; an empty path means `connection`.
    fn context_value(&self, r: &ResourceReference) -> Option<Value> {
        let key = match r.path.segments().first() {
            None => "connection",
            Some(PathSegment::Key(k)) => k.as_str(),
            Some(PathSegment::Index(_)) => return None,
        };
        self.ctx.get(key).map(|v| Value::String(v.to_string()))
    }

    fn report(&mut self, field: &FieldDescriptor, stage: Stage, message: String) {
        counter!("bridge_field_failures_total", 1u64, "stage" => stage.as_str());
        if field.required {
            warn!(field = %field.dotted(), stage = stage.as_str(), error = %message, "required field unresolved");
        } else {
            debug!(field = %field.dotted(), stage = stage.as_str(), error = %message, "optional field unresolved");
        }
        self.diagnostics.push(FieldDiagnostic { field: field.dotted(), stage, message, required: field.required });
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
