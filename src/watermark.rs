//! High-water mark of previously loaded data.

use crate::record::{ColumnValue, RecordTable};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;
use tracing::debug;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Format used for the incremental fetch filter.
pub const WATERMARK_FORMAT: &str = "%Y-%m-%d";

/// Parse a date or timestamp in any of the shapes the API and the warehouse
/// produce. Offsets are dropped, keeping the wall-clock time.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn value_timestamp(value: &ColumnValue) -> Option<NaiveDateTime> {
    match value.as_scalar()? {
        JsonValue::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Maximum value of `date_column` across `table`. Values that are missing or
/// cannot be parsed are ignored.
pub fn max_timestamp(table: &RecordTable, date_column: &str) -> Option<NaiveDateTime> {
    let mut skipped = 0usize;
    let max = table
        .column(date_column)
        .filter_map(|v| {
            let parsed = value_timestamp(v);
            if parsed.is_none() && !v.is_null() {
                skipped += 1;
            }
            parsed
        })
        .max();

    if skipped > 0 {
        debug!(
            "Ignored {} unparsable values in date column {}",
            skipped, date_column
        );
    }
    max
}

/// Watermark as a calendar date string, e.g. `2021-03-01`.
pub fn watermark(table: &RecordTable, date_column: &str) -> Option<String> {
    max_timestamp(table, date_column).map(|ts| ts.format(WATERMARK_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_watermark_is_max_date() {
        let table = RecordTable::from_json_records(vec![
            json!({"ModifiedDate": "2021-01-05"}),
            json!({"ModifiedDate": "2021-03-01"}),
            json!({"ModifiedDate": "2020-12-31"}),
        ]);
        assert_eq!(watermark(&table, "ModifiedDate").as_deref(), Some("2021-03-01"));
    }

    #[test]
    fn test_mixed_formats() {
        let table = RecordTable::from_json_records(vec![
            json!({"LastModifiedDateTime": "2022-06-01T10:15:30.123"}),
            json!({"LastModifiedDateTime": "2022-06-02T08:00:00Z"}),
            json!({"LastModifiedDateTime": "2022-05-30 23:59:59"}),
            json!({"LastModifiedDateTime": null}),
            json!({"LastModifiedDateTime": "not a date"}),
            json!({}),
        ]);
        assert_eq!(
            watermark(&table, "LastModifiedDateTime").as_deref(),
            Some("2022-06-02")
        );
    }

    #[test]
    fn test_empty_table_has_no_watermark() {
        assert_eq!(watermark(&RecordTable::new(), "ModifiedDate"), None);
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        assert!(parse_timestamp("2021-03-01").is_some());
        assert!(parse_timestamp("2021-03-01T12:00:00+02:00").is_some());
        assert!(parse_timestamp("03/01/2021").is_some());
        assert!(parse_timestamp("").is_none());
    }
}
