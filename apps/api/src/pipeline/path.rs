//! Dot-path lookup over nested values: `customer.address.city`, `items.0.sku`.

use serde_json::Value;

use crate::models::dataset::{Dataset, Fields};

/// Resolves `path` against `fields`.
///
/// An exact top-level key wins over a dotted traversal, so keys that
/// themselves contain dots stay addressable.
pub fn lookup<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    if let Some(value) = fields.get(path) {
        return Some(value);
    }

    let (head, rest) = path.split_once('.')?;
    let root = fields.get(head)?;
    lookup_in(root, rest)
}

/// Recursive descent into objects (by key) and arrays (by numeric index).
pub fn lookup_in<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    let (segment, rest) = match path.split_once('.') {
        Some((segment, rest)) => (segment, rest),
        None => (path, ""),
    };

    let next = match value {
        Value::Object(map) => map.get(segment)?,
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
        _ => return None,
    };
    lookup_in(next, rest)
}

/// Non-null lookup; null counts as absent for resolution purposes.
pub fn lookup_present<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    lookup(fields, path).filter(|v| !v.is_null())
}

/// Resolves a path against a dataset, falling back to its item list for
/// paths rooted at `items` that the fields do not define.
pub fn lookup_dataset<D: Dataset + ?Sized>(source: &D, path: &str) -> Option<Value> {
    if let Some(value) = lookup(source.fields(), path) {
        return Some(value.clone());
    }

    let rest = match path.strip_prefix("items") {
        Some("") => "",
        Some(rest) => rest.strip_prefix('.')?,
        None => return None,
    };

    let items = Value::Array(source.items().iter().cloned().map(Value::Object).collect());
    lookup_in(&items, rest).cloned()
}
