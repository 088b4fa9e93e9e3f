//! Storage collaborators consumed by the migration.
//!
//! The migration needs two capabilities from the surrounding database:
//!
//! - [`RowStore`]: keyset-paginated reads of the sensitive columns of a table,
//!   and compare-and-swap updates of single rows.
//! - [`MetadataStore`]: a small key-value area for the completion flag. Reads
//!   must not create anything, so a dry run leaves the database untouched.
//!
//! [`SqliteStore`] implements both on top of `rusqlite`.
//!
//! # Module invariants
//!
//! - **No crypto dependencies.** Stores move strings; they never see keys.

pub mod sqlite;

pub use sqlite::SqliteStore;

use common::SensitiveTable;
use thiserror::Error;

/// Errors produced by a storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The SQLite driver reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A previous holder of the connection lock panicked.
    #[error("store connection lock poisoned")]
    Poisoned,

    /// An update named a column that is not registered for the table.
    #[error("column {column} is not a sensitive column of {table}")]
    UnknownColumn { table: String, column: String },

    /// The key column holds NULLs or repeated values, so it cannot page rows.
    #[error("key column {column} of {table} is not unique and non-null")]
    NonUniqueKey { table: String, column: String },
}

/// One row read from a sensitive table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    /// Value of the table's key column.
    pub key: i64,
    /// Sensitive column values, in [`SensitiveTable::columns`] order.
    ///
    /// `None` for SQL `NULL` and for values that are not UTF-8 text.
    pub values: Vec<Option<String>>,
}

/// Replacement of one column value, applied only if the column still holds
/// `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChange {
    /// Column name.
    pub column: String,
    /// Value read during the scan.
    pub expected: String,
    /// Value to write.
    pub replacement: String,
}

/// All changes to one row, applied as a single statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    /// Key of the row to update.
    pub key: i64,
    /// Column changes; at least one.
    pub changes: Vec<ColumnChange>,
}

/// Row-level access to tables holding sensitive columns.
#[cfg_attr(test, mockall::automock)]
pub trait RowStore {
    /// Confirm that `table`'s key column addresses every row exactly once.
    ///
    /// Keyset pagination skips rows that share a key value, so a pass must not
    /// start on a table that fails this check.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NonUniqueKey`] if the key repeats or is NULL, or
    /// another [`StoreError`] if the check cannot run.
    fn check_key(&self, table: &SensitiveTable) -> Result<(), StoreError>;

    /// Read up to `limit` rows whose key is greater than `after` (or from the
    /// start when `None`), ordered by key.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn scan_batch(
        &self,
        table: &SensitiveTable,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<StoredRow>, StoreError>;

    /// Apply `update` if every changed column still holds its expected value.
    ///
    /// Returns `true` if the row was written and `false` if it was missing or
    /// had been modified concurrently.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn update_row(&self, table: &SensitiveTable, update: &RowUpdate) -> Result<bool, StoreError>;
}

/// Persistent key-value area.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataStore {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Insert or replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

impl<T: RowStore + ?Sized> RowStore for &T {
    fn check_key(&self, table: &SensitiveTable) -> Result<(), StoreError> {
        (**self).check_key(table)
    }

    fn scan_batch(
        &self,
        table: &SensitiveTable,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<StoredRow>, StoreError> {
        (**self).scan_batch(table, after, limit)
    }

    fn update_row(&self, table: &SensitiveTable, update: &RowUpdate) -> Result<bool, StoreError> {
        (**self).update_row(table, update)
    }
}

impl<T: MetadataStore + ?Sized> MetadataStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).put(key, value)
    }
}
