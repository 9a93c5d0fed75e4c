// src/rows.rs
//
// Small lookups over decoded JSON rows (arrays of objects), as returned by
// `object_get_json::<Vec<Value>>`.

use serde_json::Value;
use std::path::Path;

use crate::error::Result;

/// Matches every row in [`search`] and [`first_row`].
pub const WILDCARD: &str = "*";

fn raw_text(row: &Value, field: &str) -> Option<String> {
    match row.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Returned values are trimmed; matching uses the stored value as is.
fn field_text(row: &Value, field: &str) -> Option<String> {
    raw_text(row, field).map(|s| s.trim().to_string())
}

fn is_match(row: &Value, field: &str, needle: &str) -> bool {
    raw_text(row, field).as_deref() == Some(needle)
}

fn matches(row: &Value, field: &str, needle: &str) -> bool {
    needle == WILDCARD || is_match(row, field, needle)
}

/// Values of `return_field` from every row whose `field` equals `needle`.
pub fn search(rows: &[Value], field: &str, needle: &str, return_field: &str) -> Vec<String> {
    rows.iter()
        .filter(|r| matches(r, field, needle))
        .filter_map(|r| field_text(r, return_field))
        .collect()
}

/// First match of [`search`]; the wildcard is not special here.
pub fn search_one(rows: &[Value], field: &str, needle: &str, return_field: &str) -> Option<String> {
    rows.iter()
        .find(|r| is_match(r, field, needle))
        .and_then(|r| field_text(r, return_field))
}

pub fn first_row<'a>(rows: &'a [Value], field: &str, needle: &str) -> Option<&'a Value> {
    rows.iter().find(|r| matches(r, field, needle))
}

/// Non-blank, trimmed values of one column.
pub fn column(rows: &[Value], field: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|r| field_text(r, field))
        .filter(|v| !v.is_empty())
        .collect()
}

/// `(added, removed)` between an old and a new list.
pub fn compare<T: PartialEq + Clone>(old: &[T], new: &[T]) -> (Vec<T>, Vec<T>) {
    let added = new.iter().filter(|i| !old.contains(i)).cloned().collect();
    let removed = old.iter().filter(|i| !new.contains(i)).cloned().collect();
    (added, removed)
}

/// Like [`compare`], with the old list read from a JSON file. A missing file
/// counts as an empty list.
pub fn compare_with_file(path: &Path, new: &[Value]) -> Result<(Vec<Value>, Vec<Value>)> {
    let old: Vec<Value> = match std::fs::read(path) {
        Ok(raw) => serde_json::from_slice(&raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(compare(&old, new))
}
