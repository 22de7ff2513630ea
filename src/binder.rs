//! Derives a page's property set from the schemas of its attached tags.
//!
//! Two views of the same flattened definition list exist. The write path
//! (`reconcile`) lets the last definition of a name decide its default; the
//! read path (`effective_schema`) shows the first definition of a name.

use std::collections::{BTreeMap, HashSet};

use crate::schema::{PropertyDef, PropertyMap, SuperTag};

fn flattened<'a, 'b>(active: &'b [&'a SuperTag]) -> impl Iterator<Item = &'a PropertyDef> + 'b {
    active.iter().copied().flat_map(|tag| tag.properties.iter())
}

/// Fill defaults for properties the page has no value for.
///
/// Every existing key is carried over, including keys no active tag defines.
/// Running it twice with the same tags changes nothing.
pub fn reconcile(existing: &PropertyMap, active: &[&SuperTag]) -> PropertyMap {
    let mut last_by_name: BTreeMap<&str, &PropertyDef> = BTreeMap::new();
    for def in flattened(active) {
        last_by_name.insert(def.name.as_str(), def);
    }

    let mut result = existing.clone();
    for (name, def) in last_by_name {
        if result.contains_key(name) {
            continue;
        }
        if let Some(ref default) = def.default_value {
            result.insert(name.to_string(), default.clone());
        }
    }
    result
}

/// Property editors to show for a page, one per name, first definition wins.
pub fn effective_schema<'a>(active: &[&'a SuperTag]) -> Vec<&'a PropertyDef> {
    let mut seen = HashSet::new();
    flattened(active)
        .filter(|def| seen.insert(def.name.as_str()))
        .collect()
}

/// Required properties of the effective schema that have no stored value.
pub fn missing_required(properties: &PropertyMap, active: &[&SuperTag]) -> Vec<String> {
    effective_schema(active)
        .into_iter()
        .filter(|def| def.required && !properties.contains_key(&def.name))
        .map(|def| def.name.clone())
        .collect()
}

/// Stored keys no active tag defines.
pub fn orphaned_keys(properties: &PropertyMap, active: &[&SuperTag]) -> Vec<String> {
    let live: HashSet<&str> = flattened(active).map(|def| def.name.as_str()).collect();
    properties
        .keys()
        .filter(|key| !live.contains(key.as_str()))
        .cloned()
        .collect()
}
