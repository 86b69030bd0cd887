//! Column drops and boolean coercion.

use crate::record::{ColumnValue, RecordTable};
use crate::registry::EntityConfig;
use serde_json::Value as JsonValue;

/// Apply the entity's drop and boolean rules to every row.
///
/// Dropping a column that is not present is a no-op, and a boolean column
/// missing from a row stays missing. Running this twice yields the same table.
pub fn format_columns(table: &mut RecordTable, config: Option<&EntityConfig>) {
    let Some(config) = config else {
        return;
    };

    for row in table.rows_mut() {
        for column in config.drop_columns {
            row.remove(*column);
        }
        for column in config.bool_columns {
            if let Some(value) = row.get_mut(*column) {
                *value = ColumnValue::Scalar(JsonValue::Bool(truthy(value)));
            }
        }
    }
}

/// Strict truthiness used for boolean columns.
///
/// `null`, `false`, zero, the empty string, `"false"` and `"0"` (trimmed,
/// case-insensitive) and empty nested sequences are false; everything else
/// is true.
pub fn truthy(value: &ColumnValue) -> bool {
    match value {
        ColumnValue::Nested(rows) => !rows.is_empty(),
        ColumnValue::Scalar(v) => match v {
            JsonValue::Null => false,
            JsonValue::Bool(b) => *b,
            JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            JsonValue::String(s) => {
                let s = s.trim();
                !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
            }
            JsonValue::Array(items) => !items.is_empty(),
            JsonValue::Object(map) => !map.is_empty(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::KnownEntity;
    use serde_json::json;

    fn properties() -> RecordTable {
        RecordTable::from_json_records(vec![
            json!({
                "PropertyID": 1,
                "PropertyTags": ["vip"],
                "SeparateInvoices": 1,
                "DragDropGeoLocation": "false",
            }),
            json!({
                "PropertyID": 2,
                "SeparateInvoices": 0,
                "DragDropGeoLocation": null,
            }),
            json!({
                "PropertyID": 3,
                "SeparateInvoices": "yes",
            }),
        ])
    }

    #[test]
    fn test_drop_and_coerce() {
        let mut table = properties();
        format_columns(&mut table, Some(KnownEntity::Properties.config()));

        let rows = table.to_json_records();
        assert_eq!(
            rows[0],
            json!({"PropertyID": 1, "SeparateInvoices": true, "DragDropGeoLocation": false})
        );
        assert_eq!(
            rows[1],
            json!({"PropertyID": 2, "SeparateInvoices": false, "DragDropGeoLocation": false})
        );
        assert_eq!(rows[2], json!({"PropertyID": 3, "SeparateInvoices": true}));
    }

    #[test]
    fn test_formatting_is_idempotent() {
        let config = Some(KnownEntity::Properties.config());
        let mut once = properties();
        format_columns(&mut once, config);
        let mut twice = once.clone();
        format_columns(&mut twice, config);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_no_config_is_noop() {
        let mut table = properties();
        format_columns(&mut table, None);
        assert_eq!(table, properties());
    }

    #[test]
    fn test_truthiness_rule() {
        let cases = [
            (json!(null), false),
            (json!(false), false),
            (json!(0), false),
            (json!(0.0), false),
            (json!(""), false),
            (json!(" FALSE "), false),
            (json!("0"), false),
            (json!(true), true),
            (json!(-1), true),
            (json!("no"), true),
            (json!("true"), true),
            (json!([]), false),
            (json!([1]), true),
        ];
        for (value, expected) in cases {
            assert_eq!(truthy(&ColumnValue::from_json(value.clone())), expected, "{value}");
        }
    }
}
