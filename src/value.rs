//! Navigation helpers for semi-structured API responses.
//!
//! The SOAP layer decodes every response into a [`serde_json::Value`] tree.
//! The shapes coming back are irregular: the transport collapses
//! single-element sequences into a bare element, scalars arrive as strings,
//! and localized dictionary lookups nest one level deeper than expected.
//! These helpers make that irregularity an explicit contract instead of a
//! per-call-site surprise.

use serde_json::Value;

/// Language dictionary id for the localization the CLI displays.
pub const TARGET_LANGUAGE_ID: i64 = 2;

/// Descend a path of keys through a nested structure.
///
/// Map nodes are indexed by key; when a sequence is met, the path segment
/// is parsed as a numeric index. Returns `None` if any intermediate node is
/// absent or `null`, or if the path overruns a scalar. Never panics.
pub fn dive<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut node = value;
    for seg in path {
        node = match node {
            Value::Object(map) => map.get(*seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if node.is_null() { None } else { Some(node) }
}

/// Like [`dive`], but the result is always a sequence.
///
/// A bare element is wrapped in a one-element vec; a missing or `null`
/// node yields an empty vec. Any consumer that expects a list must go
/// through here — the wire format does not distinguish a single-element
/// list from its one element.
pub fn dive_list<'a>(value: &'a Value, path: &[&str]) -> Vec<&'a Value> {
    match dive(value, path) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
        None => Vec::new(),
    }
}

/// Descend to a string at `path`.
pub fn dive_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    dive(value, path).and_then(Value::as_str)
}

/// Descend to an integer at `path`.
///
/// Scalars decoded from XML are strings, so both native numbers and
/// numeric strings are accepted.
pub fn dive_i64(value: &Value, path: &[&str]) -> Option<i64> {
    match dive(value, path)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Select the localized variant from a dictionary-item collection.
///
/// Dictionary items carry their name variants under a pluralized
/// sub-collection: `{key}s.{key}` is a list of `{ language_dict_id, ... }`
/// records. Prefers the variant whose language id equals
/// [`TARGET_LANGUAGE_ID`]; falls back to the first variant; `None` when the
/// collection is empty.
pub fn dict_name<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let plural = format!("{key}s");
    let variants = dive_list(value, &[plural.as_str(), key]);
    if variants.is_empty() {
        return None;
    }
    variants
        .iter()
        .find(|v| dive_i64(v, &["language_dict_id"]) == Some(TARGET_LANGUAGE_ID))
        .copied()
        .or_else(|| variants.first().copied())
}

/// Localized `item_name` of a dictionary item (status, class, type names).
pub fn dict_item_name<'a>(value: &'a Value) -> Option<&'a str> {
    dict_name(value, "dictionary_item_name").and_then(|v| dive_str(v, &["item_name"]))
}
