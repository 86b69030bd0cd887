//! Column type inference and DDL generation for warehouse tables.

use crate::record::{ColumnValue, RecordTable};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Table definition inferred from a record table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, sorted by name
    pub columns: Vec<Column>,
}

impl Table {
    /// Create a new table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Infer a table definition from every value in `records`.
    pub fn infer(name: impl Into<String>, records: &RecordTable) -> Self {
        let columns = records
            .column_names()
            .into_iter()
            .map(|col| {
                let column_type = records
                    .column(&col)
                    .filter_map(ColumnType::of_value)
                    .reduce(ColumnType::widen)
                    .unwrap_or(ColumnType::Varchar);
                Column::new(col, column_type)
            })
            .collect();

        Self {
            name: name.into(),
            columns,
        }
    }

    /// Add a column.
    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Generate CREATE OR REPLACE TABLE DDL, qualified by `schema`.
    pub fn to_duckdb_ddl(&self, schema: &str) -> String {
        let col_defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", quote_ident(&c.name), c.column_type.to_duckdb()))
            .collect();

        format!(
            "CREATE OR REPLACE TABLE {} (\n{}\n)",
            qualified_name(schema, &self.name),
            col_defs.join(",\n")
        )
    }

    /// Get column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column type
    pub column_type: ColumnType,
}

impl Column {
    /// Create a new column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Warehouse column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Boolean
    Boolean,
    /// Big integer (8 bytes)
    BigInt,
    /// Double precision float
    Double,
    /// Variable-length string
    Varchar,
    /// JSON document (nested records, arrays, objects)
    Json,
}

impl ColumnType {
    /// Convert to DuckDB type string.
    pub fn to_duckdb(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Json => "JSON",
        }
    }

    /// Type of a single value. Nulls carry no type information.
    pub fn of_value(value: &ColumnValue) -> Option<Self> {
        match value {
            ColumnValue::Nested(_) => Some(ColumnType::Json),
            ColumnValue::Scalar(v) => match v {
                JsonValue::Null => None,
                JsonValue::Bool(_) => Some(ColumnType::Boolean),
                JsonValue::Number(n) if n.is_i64() => Some(ColumnType::BigInt),
                JsonValue::Number(_) => Some(ColumnType::Double),
                JsonValue::String(_) => Some(ColumnType::Varchar),
                JsonValue::Array(_) | JsonValue::Object(_) => Some(ColumnType::Json),
            },
        }
    }

    /// Smallest type able to hold values of both `self` and `other`.
    pub fn widen(self, other: Self) -> Self {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (BigInt, Double) | (Double, BigInt) => Double,
            (Json, _) | (_, Json) => Json,
            _ => Varchar,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_duckdb())
    }
}

/// Quote an identifier for DuckDB.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"schema"."table"`.
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_types() {
        let records = RecordTable::from_json_records(vec![
            json!({"id": 1, "amount": 2, "name": "a", "active": true, "tags": [{"t": 1}]}),
            json!({"id": 2, "amount": 2.5, "name": null, "active": false, "extra": {"k": "v"}}),
        ]);
        let table = Table::infer("aspire_Properties", &records);

        let ty = |name: &str| table.get_column(name).unwrap().column_type;
        assert_eq!(ty("id"), ColumnType::BigInt);
        assert_eq!(ty("amount"), ColumnType::Double);
        assert_eq!(ty("name"), ColumnType::Varchar);
        assert_eq!(ty("active"), ColumnType::Boolean);
        assert_eq!(ty("tags"), ColumnType::Json);
        assert_eq!(ty("extra"), ColumnType::Json);
    }

    #[test]
    fn test_mixed_types_fall_back_to_varchar() {
        let records = RecordTable::from_json_records(vec![json!({"x": 1}), json!({"x": "one"})]);
        let table = Table::infer("t", &records);
        assert_eq!(table.columns[0].column_type, ColumnType::Varchar);
    }

    #[test]
    fn test_all_null_column_is_varchar() {
        let records = RecordTable::from_json_records(vec![json!({"x": null})]);
        let table = Table::infer("t", &records);
        assert_eq!(table.columns[0].column_type, ColumnType::Varchar);
    }

    #[test]
    fn test_table_ddl() {
        let mut table = Table::new("aspire_Properties");
        table.add_column(Column::new("PropertyID", ColumnType::BigInt));
        table.add_column(Column::new("Name \"x\"", ColumnType::Varchar));

        let ddl = table.to_duckdb_ddl("main");
        assert!(ddl.starts_with("CREATE OR REPLACE TABLE \"main\".\"aspire_Properties\""));
        assert!(ddl.contains("\"PropertyID\" BIGINT"));
        assert!(ddl.contains("\"Name \"\"x\"\"\" VARCHAR"));
    }
}
