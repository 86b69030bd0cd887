//! In-memory record tables.
//!
//! API payloads are loosely typed: most columns hold scalars, but some hold
//! arrays of nested records (one-to-many children). A [`ColumnValue`] keeps
//! that distinction as an enum so that child extraction is a variant match.

use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// A single row: column name to value.
pub type Row = BTreeMap<String, ColumnValue>;

/// Value stored in one column of one row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Scalar JSON value, or an opaque array/object that is not a record list
    Scalar(JsonValue),
    /// Sequence of nested records
    Nested(Vec<Row>),
}

impl ColumnValue {
    /// Null scalar.
    pub const NULL: ColumnValue = ColumnValue::Scalar(JsonValue::Null);

    /// Convert a JSON value. Arrays whose elements are all objects become
    /// [`ColumnValue::Nested`]; an empty array is an empty nested sequence.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Array(items) if items.iter().all(JsonValue::is_object) => {
                ColumnValue::Nested(
                    items
                        .into_iter()
                        .filter_map(|item| match item {
                            JsonValue::Object(map) => Some(row_from_map(map)),
                            _ => None,
                        })
                        .collect(),
                )
            }
            other => ColumnValue::Scalar(other),
        }
    }

    /// Convert back to JSON.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ColumnValue::Scalar(v) => v.clone(),
            ColumnValue::Nested(rows) => JsonValue::Array(
                rows.iter()
                    .map(|r| JsonValue::Object(row_to_map(r)))
                    .collect(),
            ),
        }
    }

    /// Whether this is a null scalar.
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Scalar(JsonValue::Null))
    }

    /// Borrow the scalar value, if any.
    pub fn as_scalar(&self) -> Option<&JsonValue> {
        match self {
            ColumnValue::Scalar(v) => Some(v),
            ColumnValue::Nested(_) => None,
        }
    }
}

impl From<JsonValue> for ColumnValue {
    fn from(value: JsonValue) -> Self {
        ColumnValue::from_json(value)
    }
}

/// Convert a JSON object into a row.
pub fn row_from_map(map: Map<String, JsonValue>) -> Row {
    map.into_iter()
        .map(|(k, v)| (k, ColumnValue::from_json(v)))
        .collect()
}

/// Convert a row into a JSON object.
pub fn row_to_map(row: &Row) -> Map<String, JsonValue> {
    row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// Ordered sequence of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    rows: Vec<Row>,
}

impl RecordTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from JSON records. Non-object records are skipped.
    pub fn from_json_records(records: impl IntoIterator<Item = JsonValue>) -> Self {
        let rows = records
            .into_iter()
            .filter_map(|record| match record {
                JsonValue::Object(map) => Some(row_from_map(map)),
                other => {
                    tracing::warn!("Skipping non-object record: {}", other);
                    None
                }
            })
            .collect();
        Self { rows }
    }

    /// Convert every row back to a JSON object.
    pub fn to_json_records(&self) -> Vec<JsonValue> {
        self.rows
            .iter()
            .map(|r| JsonValue::Object(row_to_map(r)))
            .collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrow the rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Mutably borrow the rows.
    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    /// Append a row.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Union of column names across rows, sorted.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rows
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Values of one column, skipping rows that lack it.
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ColumnValue> + 'a {
        self.rows.iter().filter_map(move |r| r.get(name))
    }
}

impl From<Vec<Row>> for RecordTable {
    fn from(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}

impl FromIterator<Row> for RecordTable {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RecordTable {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_of_objects_is_nested() {
        let value = ColumnValue::from_json(json!([{"ContactID": 1}, {"ContactID": 2}]));
        match value {
            ColumnValue::Nested(rows) => assert_eq!(rows.len(), 2),
            other => panic!("expected nested, got {:?}", other),
        }
    }

    #[test]
    fn test_scalar_arrays_stay_opaque() {
        let value = ColumnValue::from_json(json!(["a", "b"]));
        assert_eq!(value, ColumnValue::Scalar(json!(["a", "b"])));

        let mixed = ColumnValue::from_json(json!([{"a": 1}, 2]));
        assert!(matches!(mixed, ColumnValue::Scalar(_)));
    }

    #[test]
    fn test_empty_array_is_empty_nested() {
        assert_eq!(ColumnValue::from_json(json!([])), ColumnValue::Nested(vec![]));
    }

    #[test]
    fn test_json_records_round_trip() {
        let records = vec![
            json!({"PropertyID": 1, "PropertyContacts": [{"PropertyContactID": 10}]}),
            json!({"PropertyID": 2, "PropertyContacts": []}),
        ];
        let table = RecordTable::from_json_records(records.clone());
        assert_eq!(table.len(), 2);
        assert_eq!(table.to_json_records(), records);
    }

    #[test]
    fn test_non_object_records_are_skipped() {
        let table = RecordTable::from_json_records(vec![json!(1), json!({"a": 1})]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_column_names_union() {
        let table = RecordTable::from_json_records(vec![json!({"b": 1}), json!({"a": 2, "b": 3})]);
        assert_eq!(table.column_names(), vec!["a", "b"]);
    }
}
