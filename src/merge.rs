//! Upsert of incoming rows into an existing table.

use crate::record::{ColumnValue, RecordTable, Row};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Merge `incoming` into `existing` by `id_column`.
///
/// Existing rows whose identifier appears in `incoming` are discarded; the
/// survivors come first, followed by every incoming row. Rows are replaced
/// whole, never patched field by field. Rows with a missing or null
/// identifier never match anything.
pub fn upsert(existing: RecordTable, incoming: Option<RecordTable>, id_column: &str) -> RecordTable {
    let Some(incoming) = incoming.filter(|t| !t.is_empty()) else {
        return existing;
    };

    let replaced: HashSet<IdKey> = incoming
        .rows()
        .iter()
        .filter_map(|row| id_key(row, id_column))
        .collect();

    existing
        .into_iter()
        .filter(|row| id_key(row, id_column).is_none_or(|key| !replaced.contains(&key)))
        .chain(incoming)
        .collect()
}

/// Comparison key of a row identifier.
///
/// The JSON type is part of the key, so the string `"12"` and the number `12`
/// are different identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKey {
    /// String identifier, compared by content
    Str(String),
    /// Numeric identifier, compared by value (`12` equals `12.0`)
    Num(String),
    /// Any other identifier, compared by its JSON text
    Other(String),
}

/// Comparison key for a row's identifier, `None` when missing or null.
pub fn id_key(row: &Row, id_column: &str) -> Option<IdKey> {
    match row.get(id_column)? {
        ColumnValue::Scalar(JsonValue::Null) => None,
        ColumnValue::Scalar(JsonValue::String(s)) => Some(IdKey::Str(s.clone())),
        ColumnValue::Scalar(JsonValue::Number(n)) => Some(IdKey::Num(
            match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => i.to_string(),
                (_, Some(u), _) => u.to_string(),
                (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => (f as i64).to_string(),
                _ => n.to_string(),
            },
        )),
        ColumnValue::Scalar(other) => Some(IdKey::Other(other.to_string())),
        nested @ ColumnValue::Nested(_) => Some(IdKey::Other(nested.to_json().to_string())),
    }
}
