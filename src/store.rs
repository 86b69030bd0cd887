//! Table storage abstraction used by the sync orchestrator.

use crate::error::Result;
use crate::record::RecordTable;
use std::collections::HashMap;
use std::sync::Mutex;

/// Whole-table read and replace.
pub trait TableStore {
    /// Read every row of `table`, or `None` if the table does not exist.
    fn read_table(&self, table: &str) -> Result<Option<RecordTable>>;

    /// Replace `table` with exactly `rows`, creating it if needed. A table
    /// with no columns removes the stored table. Returns the number of rows
    /// written.
    fn write_table(&self, table: &str, rows: &RecordTable) -> Result<usize>;
}

impl<T: TableStore + ?Sized> TableStore for &T {
    fn read_table(&self, table: &str) -> Result<Option<RecordTable>> {
        (**self).read_table(table)
    }

    fn write_table(&self, table: &str, rows: &RecordTable) -> Result<usize> {
        (**self).write_table(table, rows)
    }
}

/// In-process store, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, RecordTable>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `table`.
    pub fn with_table(self, name: impl Into<String>, rows: RecordTable) -> Self {
        self.lock().insert(name.into(), rows);
        self
    }

    /// Snapshot of a table.
    pub fn get(&self, table: &str) -> Option<RecordTable> {
        self.lock().get(table).cloned()
    }

    /// Names of stored tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RecordTable>> {
        // A panic while holding the lock cannot leave a table half-written.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TableStore for MemoryStore {
    fn read_table(&self, table: &str) -> Result<Option<RecordTable>> {
        Ok(self.get(table))
    }

    fn write_table(&self, table: &str, rows: &RecordTable) -> Result<usize> {
        let mut tables = self.lock();
        if rows.column_names().is_empty() {
            tables.remove(table);
            return Ok(0);
        }
        tables.insert(table.to_string(), rows.clone());
        Ok(rows.len())
    }
}
