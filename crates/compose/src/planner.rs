//! Locator planning: collapse every reference in a descriptor forest into the
//! minimal set of backing fetches. Pure; no I/O.

use std::collections::{BTreeMap, BTreeSet};

use bridge_core::{walk, FetchLocator, FieldDescriptor, LocatorKey};

/// One locator per `(resourceKind, label)`, carrying the union of the group's
/// name patterns. Output is sorted by key so equal inputs give equal plans.
pub fn plan(descriptors: &[FieldDescriptor]) -> Vec<FetchLocator> {
    let mut groups: BTreeMap<LocatorKey, BTreeSet<&str>> = BTreeMap::new();
    for field in walk(descriptors) {
        for r in field.references.iter().filter(|r| !r.is_context()) {
            let patterns = groups.entry(r.locator_key()).or_default();
            if let Some(p) = r.name_pattern.as_deref() {
                patterns.insert(p);
            }
        }
    }
    groups
        .into_iter()
        .map(|(key, patterns)| FetchLocator {
            resource_kind: key.resource_kind,
            label: key.label,
            name_patterns: patterns.into_iter().map(str::to_string).collect(),
        })
        .collect()
}
