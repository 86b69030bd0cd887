//! MotherDuck (DuckDB) client for aspire-duck-sync.

use crate::config::MotherDuckConfig;
use crate::error::{Error, Result};
use crate::record::{ColumnValue, RecordTable};
use crate::schema::{ColumnType, Table, qualified_name, quote_ident};
use crate::store::TableStore;
use duckdb::Connection;
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

const DEFAULT_BATCH_SIZE: usize = 1000;

/// MotherDuck client wrapper.
pub struct MotherDuckClient {
    conn: Connection,
    config: MotherDuckConfig,
    batch_size: usize,
}

impl MotherDuckClient {
    /// Connect to MotherDuck, or to a local DuckDB database when
    /// `local_path` is set.
    #[instrument(skip(config), fields(database = %config.database))]
    pub fn connect(config: MotherDuckConfig) -> Result<Self> {
        let conn = match config.local_path.as_deref() {
            Some(":memory:") => {
                info!("Opening in-memory DuckDB database");
                Connection::open_in_memory()
                    .map_err(|e| Error::motherduck_connection("Failed to open in-memory database", e))?
            }
            Some(path) => {
                info!("Opening local DuckDB database: {}", path);
                Connection::open(path).map_err(|e| {
                    Error::motherduck_connection(format!("Failed to open {}", path), e)
                })?
            }
            None => Self::open_motherduck(&config)?,
        };

        let client = Self {
            conn,
            config,
            batch_size: DEFAULT_BATCH_SIZE,
        };
        client.ensure_schema()?;
        Ok(client)
    }

    fn open_motherduck(config: &MotherDuckConfig) -> Result<Connection> {
        info!("Connecting to MotherDuck...");

        if config.create_database {
            let init_conn_str = format!("md:?motherduck_token={}", config.token);
            let init_conn = Connection::open(&init_conn_str)
                .map_err(|e| Error::motherduck_connection("Failed to connect to MotherDuck", e))?;

            let create_db = format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(&config.database));
            init_conn
                .execute(&create_db, [])
                .map_err(|e| Error::motherduck_query("", "Failed to create database", e))?;

            info!("Ensured database exists: {}", config.database);
        }

        let conn_str = format!("md:{}?motherduck_token={}", config.database, config.token);
        let conn = Connection::open(&conn_str)
            .map_err(|e| Error::motherduck_connection("Failed to connect to database", e))?;

        info!("Connected to MotherDuck database: {}", config.database);
        Ok(conn)
    }

    /// Set rows per INSERT statement.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Test connectivity.
    pub fn ping(&self) -> Result<()> {
        self.conn
            .execute("SELECT 1", [])
            .map_err(|e| Error::motherduck_query("", "Ping failed", e))?;
        Ok(())
    }

    /// Ensure schema exists.
    pub fn ensure_schema(&self) -> Result<()> {
        if self.config.schema != "main" {
            let query = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&self.config.schema));
            self.conn
                .execute(&query, [])
                .map_err(|e| Error::motherduck_query("", "Create schema failed", e))?;
        }
        Ok(())
    }

    /// Check if table exists.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
            )
            .map_err(|e| Error::motherduck_query(table, "Check table exists failed", e))?;

        let count: i64 = stmt
            .query_row([self.config.schema.as_str(), table], |row| row.get(0))
            .map_err(|e| Error::motherduck_query(table, "Check table exists failed", e))?;

        Ok(count > 0)
    }

    /// Get row count for a table.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", self.qualified(table));
        let mut stmt = self
            .conn
            .prepare(&query)
            .map_err(|e| Error::motherduck_query(table, "Prepare count failed", e))?;

        stmt.query_row([], |row| row.get(0))
            .map_err(|e| Error::motherduck_query(table, "Count failed", e))
    }

    /// Drop a table if it exists.
    pub fn drop_table(&self, table: &str) -> Result<()> {
        let query = format!("DROP TABLE IF EXISTS {}", self.qualified(table));
        self.conn
            .execute(&query, [])
            .map_err(|e| Error::motherduck_query(table, "Drop table failed", e))?;
        Ok(())
    }

    fn qualified(&self, table: &str) -> String {
        qualified_name(&self.config.schema, table)
    }

    fn replace_table(&self, name: &str, rows: &RecordTable) -> Result<usize> {
        let table = Table::infer(name, rows);
        let ddl = table.to_duckdb_ddl(&self.config.schema);
        debug!("Replacing table with DDL: {}", ddl);

        self.conn
            .execute(&ddl, [])
            .map_err(|e| Error::motherduck_query(name, "Create table failed", e))?;

        let col_names = table
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut total = 0;
        for chunk in rows.rows().chunks(self.batch_size) {
            let values_parts: Vec<String> = chunk
                .iter()
                .map(|row| {
                    let row_values: Vec<String> = table
                        .columns
                        .iter()
                        .map(|col| {
                            let value = row.get(&col.name).unwrap_or(&ColumnValue::NULL);
                            value_to_sql_literal(value, col.column_type)
                        })
                        .collect();
                    format!("({})", row_values.join(", "))
                })
                .collect();

            let query = format!(
                "INSERT INTO {} ({}) VALUES {}",
                self.qualified(name),
                col_names,
                values_parts.join(", ")
            );

            self.conn
                .execute(&query, [])
                .map_err(|e| Error::motherduck_query(name, "Bulk insert failed", e))?;
            total += chunk.len();
        }

        Ok(total)
    }
}

impl TableStore for MotherDuckClient {
    #[instrument(skip(self))]
    fn read_table(&self, table: &str) -> Result<Option<RecordTable>> {
        if !self.table_exists(table)? {
            debug!("Table {} does not exist yet", table);
            return Ok(None);
        }

        let query = format!(
            "SELECT CAST(to_json(t) AS VARCHAR) FROM {} AS t",
            self.qualified(table)
        );
        let mut stmt = self
            .conn
            .prepare(&query)
            .map_err(|e| Error::motherduck_query(table, "Prepare read failed", e))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::motherduck_query(table, "Read failed", e))?;

        let mut records = Vec::new();
        for row in rows {
            let text = row.map_err(|e| Error::motherduck_query(table, "Read row failed", e))?;
            let record: JsonValue = serde_json::from_str(&text)
                .map_err(|e| Error::serialization(format!("Invalid row JSON in {}", table), e))?;
            records.push(record);
        }

        debug!("Read {} rows from {}", records.len(), table);
        Ok(Some(RecordTable::from_json_records(records)))
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    fn write_table(&self, table: &str, rows: &RecordTable) -> Result<usize> {
        if rows.column_names().is_empty() {
            warn!("No columns to write for {}; dropping table", table);
            self.drop_table(table)?;
            return Ok(0);
        }

        self.conn.execute("BEGIN TRANSACTION", []).map_err(|e| {
            Error::motherduck_query(table, "Begin transaction failed", e)
        })?;

        match self.replace_table(table, rows) {
            Ok(count) => {
                self.conn
                    .execute("COMMIT", [])
                    .map_err(|e| Error::motherduck_query(table, "Commit failed", e))?;
                info!("Wrote {} rows to {}", count, table);
                Ok(count)
            }
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }
}

/// Render a value as a SQL literal for a column of type `column_type`.
fn value_to_sql_literal(value: &ColumnValue, column_type: ColumnType) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }

    match (value, column_type) {
        (_, ColumnType::Json) => quote_literal(&value.to_json().to_string()),
        (ColumnValue::Scalar(JsonValue::Bool(b)), ColumnType::Boolean) => {
            if *b { "TRUE" } else { "FALSE" }.to_string()
        }
        (ColumnValue::Scalar(JsonValue::Number(n)), ColumnType::BigInt | ColumnType::Double) => {
            n.to_string()
        }
        (ColumnValue::Scalar(JsonValue::String(s)), _) => quote_literal(s),
        (other, _) => quote_literal(&other.to_json().to_string()),
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_client() -> MotherDuckClient {
        MotherDuckClient::connect(MotherDuckConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_sql_literals() {
        let lit = |v: JsonValue, t| value_to_sql_literal(&ColumnValue::from_json(v), t);
        assert_eq!(lit(JsonValue::Null, ColumnType::BigInt), "NULL");
        assert_eq!(lit(json!(true), ColumnType::Boolean), "TRUE");
        assert_eq!(lit(json!(42), ColumnType::BigInt), "42");
        assert_eq!(lit(json!("O'Neil"), ColumnType::Varchar), "'O''Neil'");
        assert_eq!(lit(json!(7), ColumnType::Varchar), "'7'");
        assert_eq!(lit(json!("x"), ColumnType::Json), "'\"x\"'");
        assert_eq!(lit(json!([{"a": 1}]), ColumnType::Json), "'[{\"a\":1}]'");
    }

    #[test]
    fn test_missing_table_reads_as_none() {
        let client = memory_client();
        assert!(client.read_table("aspire_Properties").unwrap().is_none());
        assert!(!client.table_exists("aspire_Properties").unwrap());
    }

    #[test]
    fn test_write_then_read() {
        let client = memory_client().with_batch_size(2);
        let rows = RecordTable::from_json_records(vec![
            json!({"PropertyID": 1, "Name": "A", "Active": true}),
            json!({"PropertyID": 2, "Name": "B's", "Active": false}),
            json!({"PropertyID": 3, "Name": null, "Active": null}),
        ]);

        assert_eq!(client.write_table("aspire_Properties", &rows).unwrap(), 3);
        assert_eq!(client.count_rows("aspire_Properties").unwrap(), 3);

        let read = client.read_table("aspire_Properties").unwrap().unwrap();
        let mut records = read.to_json_records();
        records.sort_by_key(|r| r["PropertyID"].as_i64());
        assert_eq!(records, rows.to_json_records());
    }

    #[test]
    fn test_write_replaces_contents() {
        let client = memory_client();
        let first = RecordTable::from_json_records(vec![json!({"id": 1}), json!({"id": 2})]);
        client.write_table("t", &first).unwrap();

        let second = RecordTable::from_json_records(vec![json!({"id": 3, "extra": "x"})]);
        client.write_table("t", &second).unwrap();

        let read = client.read_table("t").unwrap().unwrap();
        assert_eq!(read.to_json_records(), vec![json!({"extra": "x", "id": 3})]);
    }

    #[test]
    fn test_empty_table_is_dropped() {
        let client = memory_client();
        client
            .write_table("t", &RecordTable::from_json_records(vec![json!({"id": 1})]))
            .unwrap();
        assert_eq!(client.write_table("t", &RecordTable::new()).unwrap(), 0);
        assert!(!client.table_exists("t").unwrap());
    }
}
