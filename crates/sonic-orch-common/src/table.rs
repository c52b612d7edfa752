//! Key to field/value tables.
//!
//! A [`Table`] is one Redis hash namespace (`COUNTERS`, `PFC_WD_STATE_TABLE`,
//! ...). Writes merge fields into the existing record like `HSET`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::FieldValue;

/// Errors from table access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("Table {table} backend error: {message}")]
    Backend { table: String, message: String },
}

impl TableError {
    pub fn backend(table: impl Into<String>, message: impl Into<String>) -> Self {
        TableError::Backend {
            table: table.into(),
            message: message.into(),
        }
    }
}

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// A key to field/value store.
pub trait Table: Send + Sync {
    /// Returns the table name.
    fn name(&self) -> &str;

    /// Reads every field of a record; `None` if the key does not exist.
    fn get(&self, key: &str) -> TableResult<Option<Vec<FieldValue>>>;

    /// Reads one field of a record.
    fn hget(&self, key: &str, field: &str) -> TableResult<Option<String>> {
        Ok(self
            .get(key)?
            .and_then(|fvs| fvs.into_iter().find(|(f, _)| f == field).map(|(_, v)| v)))
    }

    /// Writes fields into a record, creating it if needed. Fields not named
    /// keep their current value.
    fn set(&self, key: &str, fvs: &[FieldValue]) -> TableResult<()>;

    /// Deletes a record. Deleting a missing key is not an error.
    fn del(&self, key: &str) -> TableResult<()>;

    /// Lists every key in the table.
    fn keys(&self) -> TableResult<Vec<String>>;
}

/// In-memory [`Table`], used when no Redis server is available and in tests.
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    rows: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    failing: AtomicBool,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(BTreeMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, BTreeMap<String, BTreeMap<String, String>>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self) -> TableResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(TableError::backend(&self.name, "injected failure"))
        } else {
            Ok(())
        }
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> TableResult<Option<Vec<FieldValue>>> {
        self.check()?;
        Ok(self.rows().get(key).map(|row| {
            row.iter()
                .map(|(f, v)| (f.clone(), v.clone()))
                .collect()
        }))
    }

    fn set(&self, key: &str, fvs: &[FieldValue]) -> TableResult<()> {
        self.check()?;
        let mut rows = self.rows();
        let row = rows.entry(key.to_string()).or_default();
        for (field, value) in fvs {
            row.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    fn del(&self, key: &str) -> TableResult<()> {
        self.check()?;
        self.rows().remove(key);
        Ok(())
    }

    fn keys(&self) -> TableResult<Vec<String>> {
        self.check()?;
        Ok(self.rows().keys().cloned().collect())
    }
}
