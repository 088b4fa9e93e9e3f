//! Common error types shared across crates.

use thiserror::Error;

/// Errors raised while building the sensitive-column registry.
///
/// Every variant is a configuration mistake: the registry is assembled once at
/// startup and a bad entry must stop the process before any row is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A table or column name is not a plain SQL identifier.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A table entry lists no sensitive columns.
    #[error("table {0} lists no sensitive columns")]
    NoColumns(String),

    /// The same column appears twice in one table entry.
    #[error("table {table} lists column {column} more than once")]
    DuplicateColumn { table: String, column: String },

    /// The key column is also listed as a sensitive column.
    #[error("table {table} uses sensitive column {column} as its key")]
    KeyIsSensitive { table: String, column: String },

    /// The same table is registered twice.
    #[error("table {0} is registered more than once")]
    DuplicateTable(String),
}
