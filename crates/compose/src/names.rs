//! Name interpolation and regex name matching.

use bridge_core::{NameResolutionError, Resource, ResolutionContext};
use once_cell::sync::Lazy;
use regex::Regex;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("placeholder regex compiles"));

/// Substitute every `{{variable}}` from `ctx`. With `escape`, substituted
/// values are regex-escaped so they match literally.
pub fn interpolate(template: &str, ctx: &ResolutionContext, escape: bool) -> Result<String, NameResolutionError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(var)) = (caps.get(0), caps.get(1)) else { continue };
        let value = ctx.get(var.as_str()).ok_or_else(|| NameResolutionError::UnknownVariable {
            pattern: template.to_string(),
            variable: var.as_str().to_string(),
        })?;
        out.push_str(&template[last..whole.start()]);
        if escape {
            out.push_str(&regex::escape(value));
        } else {
            out.push_str(value);
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

pub fn compile_pattern(pattern: &str, ctx: &ResolutionContext) -> Result<Regex, NameResolutionError> {
    let expanded = interpolate(pattern, ctx, true)?;
    Regex::new(&expanded).map_err(|e| NameResolutionError::InvalidPattern { pattern: pattern.to_string(), message: e.to_string() })
}

pub fn resource_name(r: &Resource) -> Option<&str> {
    r.get("metadata")?.get("name")?.as_str()
}

/// Subset of `resources` whose `metadata.name` matches `pattern` after
/// interpolation, in input order. No pattern passes everything through.
pub fn resolve_names<'a>(
    resources: &'a [Resource],
    pattern: Option<&str>,
    ctx: &ResolutionContext,
) -> Result<Vec<&'a Resource>, NameResolutionError> {
    let Some(pattern) = pattern else { return Ok(resources.iter().collect()) };
    let re = compile_pattern(pattern, ctx)?;
    Ok(resources
        .iter()
        .filter(|r| resource_name(r).map(|n| re.is_match(n)).unwrap_or(false))
        .collect())
}
