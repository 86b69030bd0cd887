//! Child-table extraction.
//!
//! Declared nested columns are peeled off into their own tables. Each child
//! row gets the parent's identifier under the parent's identifier column name,
//! then the child table is processed the same way with its own rules.

use crate::error::{Error, Result};
use crate::format::format_columns;
use crate::record::{ColumnValue, RecordTable, Row};
use crate::registry::{EntityConfig, KnownEntity};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Maximum depth of nested child tables below a top-level entity.
pub const MAX_NESTING_DEPTH: usize = 8;

/// A table split out of its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildTable {
    /// Child entity
    pub entity: KnownEntity,
    /// Column holding the immediate parent's identifier
    pub link_column: String,
    /// Extracted rows
    pub table: RecordTable,
}

/// Result of extracting all descendant tables of an entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Parent rows with child columns removed, formatted
    pub parent: RecordTable,
    /// Every descendant table, keyed by entity name
    pub children: BTreeMap<String, ChildTable>,
}

impl Extraction {
    /// Entity name to link column, for every descendant table.
    pub fn parent_links(&self) -> BTreeMap<&str, &str> {
        self.children
            .iter()
            .map(|(name, child)| (name.as_str(), child.link_column.as_str()))
            .collect()
    }

    /// Total rows across descendant tables.
    pub fn child_row_count(&self) -> usize {
        self.children.values().map(|c| c.table.len()).sum()
    }
}

/// Split `table` into its parent rows and every descendant child table, then
/// format all of them. Entities without rules are returned unchanged.
pub fn extract_children(table: RecordTable, config: Option<&EntityConfig>) -> Result<Extraction> {
    extract_bounded(table, config, MAX_NESTING_DEPTH)
}

/// [`extract_children`] with an explicit nesting bound. The registry's
/// deepest chain is two levels, well inside [`MAX_NESTING_DEPTH`].
fn extract_bounded(
    table: RecordTable,
    config: Option<&EntityConfig>,
    max_depth: usize,
) -> Result<Extraction> {
    let mut children = BTreeMap::new();
    let parent = extract_into(table, config, 0, max_depth, &mut children)?;
    Ok(Extraction { parent, children })
}

fn extract_into(
    mut table: RecordTable,
    config: Option<&EntityConfig>,
    depth: usize,
    max_depth: usize,
    out: &mut BTreeMap<String, ChildTable>,
) -> Result<RecordTable> {
    let Some(config) = config else {
        return Ok(table);
    };

    for child in config.child_entities {
        if depth >= max_depth {
            return Err(Error::schema(format!(
                "Nested table '{}' exceeds maximum depth of {}",
                child, max_depth
            )));
        }

        let child_table = take_child_table(&mut table, child.name(), config.id_column);
        debug!(
            "Extracted {} rows for child table {} (linked by {})",
            child_table.len(),
            child,
            config.id_column
        );

        let child_table =
            extract_into(child_table, Some(child.config()), depth + 1, max_depth, out)?;
        out.insert(
            child.name().to_string(),
            ChildTable {
                entity: *child,
                link_column: config.id_column.to_string(),
                table: child_table,
            },
        );
    }

    format_columns(&mut table, Some(config));
    Ok(table)
}

/// Remove `column` from every row of `table` and return its nested records as
/// a new table, each row tagged with the parent's `parent_id_column` value.
pub fn take_child_table(table: &mut RecordTable, column: &str, parent_id_column: &str) -> RecordTable {
    let mut child_rows = Vec::new();

    for row in table.rows_mut() {
        let parent_id = row
            .get(parent_id_column)
            .cloned()
            .unwrap_or(ColumnValue::NULL);

        match row.remove(column) {
            Some(ColumnValue::Nested(nested)) => {
                for record in nested {
                    let mut child: Row = Row::new();
                    child.insert(parent_id_column.to_string(), parent_id.clone());
                    child.extend(record);
                    child_rows.push(child);
                }
            }
            Some(value) if !value.is_null() => {
                warn!(
                    "Column {} holds a non-record value; no child rows extracted",
                    column
                );
            }
            _ => {}
        }
    }

    RecordTable::from(child_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_rows_carry_parent_id() {
        let table = RecordTable::from_json_records(vec![
            json!({"PropertyID": 1, "PropertyContacts": [
                {"PropertyContactID": 10, "EmailInvoiceContact": true},
                {"PropertyContactID": 11},
            ]}),
            json!({"PropertyID": 2, "PropertyContacts": []}),
            json!({"PropertyID": 3, "PropertyContacts": [{"PropertyContactID": 12}]}),
        ]);

        let extraction =
            extract_children(table, Some(KnownEntity::Properties.config())).unwrap();

        assert_eq!(extraction.parent.len(), 3);
        assert!(extraction
            .parent
            .rows()
            .iter()
            .all(|r| !r.contains_key("PropertyContacts")));

        let contacts = &extraction.children["PropertyContacts"];
        assert_eq!(contacts.link_column, "PropertyID");
        assert_eq!(
            contacts.table.to_json_records(),
            vec![
                json!({"PropertyID": 1, "PropertyContactID": 10}),
                json!({"PropertyID": 1, "PropertyContactID": 11}),
                json!({"PropertyID": 3, "PropertyContactID": 12}),
            ]
        );
    }

    #[test]
    fn test_child_row_count_is_sum_of_nested_lengths() {
        let counts = [0usize, 3, 1, 0, 5];
        let records: Vec<_> = counts
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let contacts: Vec<_> = (0..n)
                    .map(|j| json!({"PropertyContactID": i * 100 + j}))
                    .collect();
                json!({"PropertyID": i, "PropertyContacts": contacts})
            })
            .collect();

        let extraction = extract_children(
            RecordTable::from_json_records(records),
            Some(KnownEntity::Properties.config()),
        )
        .unwrap();

        let contacts = &extraction.children["PropertyContacts"].table;
        assert_eq!(contacts.len(), counts.iter().sum::<usize>());
        for row in contacts.rows() {
            let parent = row["PropertyID"].as_scalar().unwrap().as_u64().unwrap();
            let contact = row["PropertyContactID"].as_scalar().unwrap().as_u64().unwrap();
            assert_eq!(contact / 100, parent);
        }
    }

    #[test]
    fn test_grandchildren_link_to_immediate_parent() {
        let table = RecordTable::from_json_records(vec![json!({
            "InvoiceID": 7,
            "InvoiceOpportunities": [{
                "InvoiceOpportunityID": 70,
                "InvoiceOpportunityServices": [
                    {"InvoiceOpportunityServiceID": 700, "InvoiceOpportunityServiceItems": [{"x": 1}]},
                    {"InvoiceOpportunityServiceID": 701},
                ],
            }],
        })]);

        let extraction = extract_children(table, Some(KnownEntity::Invoices.config())).unwrap();

        assert_eq!(extraction.parent.to_json_records(), vec![json!({"InvoiceID": 7})]);

        let opps = &extraction.children["InvoiceOpportunities"];
        assert_eq!(opps.link_column, "InvoiceID");
        assert_eq!(
            opps.table.to_json_records(),
            vec![json!({"InvoiceID": 7, "InvoiceOpportunityID": 70})]
        );

        let services = &extraction.children["InvoiceOpportunityServices"];
        assert_eq!(services.link_column, "InvoiceOpportunityID");
        assert_eq!(
            services.table.to_json_records(),
            vec![
                json!({"InvoiceOpportunityID": 70, "InvoiceOpportunityServiceID": 700}),
                json!({"InvoiceOpportunityID": 70, "InvoiceOpportunityServiceID": 701}),
            ]
        );

        let links = extraction.parent_links();
        assert_eq!(links["InvoiceOpportunityServices"], "InvoiceOpportunityID");
    }

    #[test]
    fn test_nesting_beyond_bound_is_rejected() {
        let invoice = || {
            RecordTable::from_json_records(vec![json!({
                "InvoiceID": 1,
                "InvoiceOpportunities": [{
                    "InvoiceOpportunityID": 2,
                    "InvoiceOpportunityServices": [{"InvoiceOpportunityServiceID": 3}],
                }],
            })])
        };
        let config = Some(KnownEntity::Invoices.config());

        let err = extract_bounded(invoice(), config, 1).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_ERROR");
        assert!(err.to_string().contains("InvoiceOpportunityServices"));

        let extraction = extract_bounded(invoice(), config, 2).unwrap();
        assert_eq!(extraction.child_row_count(), 2);
    }

    #[test]
    fn test_registry_fits_within_nesting_bound() {
        fn depth(entity: KnownEntity) -> usize {
            entity
                .config()
                .child_entities
                .iter()
                .map(|c| 1 + depth(*c))
                .max()
                .unwrap_or(0)
        }
        for entity in KnownEntity::ALL {
            assert!(depth(entity) <= MAX_NESTING_DEPTH, "{} nests too deep", entity);
        }
    }

    #[test]
    fn test_undeclared_nested_columns_are_untouched() {
        let table = RecordTable::from_json_records(vec![json!({
            "WorkTicketID": 1,
            "WorkTicketItems": [{"ItemID": 5}],
        })]);
        let extraction = extract_children(table.clone(), Some(KnownEntity::WorkTickets.config()))
            .unwrap();
        assert!(extraction.children.is_empty());
        assert_eq!(extraction.parent, table);
    }

    #[test]
    fn test_unconfigured_entity_passes_through() {
        let table = RecordTable::from_json_records(vec![json!({"BranchID": 1, "Tags": [{"a": 1}]})]);
        let extraction = extract_children(table.clone(), None).unwrap();
        assert_eq!(extraction.parent, table);
        assert_eq!(extraction.child_row_count(), 0);
    }

    #[test]
    fn test_missing_parent_id_links_null() {
        let mut table = RecordTable::from_json_records(vec![json!({
            "PropertyContacts": [{"PropertyContactID": 1}],
        })]);
        let child = take_child_table(&mut table, "PropertyContacts", "PropertyID");
        assert_eq!(
            child.to_json_records(),
            vec![json!({"PropertyID": null, "PropertyContactID": 1})]
        );
    }
}
