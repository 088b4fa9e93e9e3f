//! Migration report types.
//!
//! These types are logged by the migrator and printed as JSON on stdout, so
//! they carry counts only. No field value, plaintext or ciphertext, ever
//! appears in a report.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Whether a pass rewrote rows or only counted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    /// Plaintext values were encrypted and written back.
    Apply,
    /// Values were classified but nothing was written.
    Survey,
}

// ---------------------------------------------------------------------------
// Per-table counts
// ---------------------------------------------------------------------------

/// Counts gathered while walking one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// Rows read from the table.
    pub rows_scanned: u64,
    /// Plaintext values encrypted (or, in a survey, that would be).
    pub values_encrypted: u64,
    /// Values already ciphertext-shaped and left alone.
    pub values_skipped: u64,
    /// Rows written back.
    pub rows_updated: u64,
    /// Row updates dropped because a concurrent writer changed the row first.
    pub conflicts: u64,
}

impl TableReport {
    /// Create an empty report for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Whole run
// ---------------------------------------------------------------------------

/// Outcome of one migration or survey invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Whether rows were rewritten.
    pub mode: MigrationMode,
    /// `true` when the completion flag was already set and nothing was read.
    pub already_completed: bool,
    /// One entry per table, in processing order.
    pub tables: Vec<TableReport>,
}

impl MigrationReport {
    /// Report for a run that found the completion flag already set.
    pub fn already_completed() -> Self {
        Self {
            mode: MigrationMode::Apply,
            already_completed: true,
            tables: Vec::new(),
        }
    }

    /// Report for a run that walked `tables`.
    pub fn completed(mode: MigrationMode, tables: Vec<TableReport>) -> Self {
        Self {
            mode,
            already_completed: false,
            tables,
        }
    }

    /// Total values encrypted across all tables.
    pub fn values_encrypted(&self) -> u64 {
        self.tables.iter().map(|t| t.values_encrypted).sum()
    }

    /// Total rows written across all tables.
    pub fn rows_updated(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_updated).sum()
    }

    /// Total CAS conflicts across all tables.
    pub fn conflicts(&self) -> u64 {
        self.tables.iter().map(|t| t.conflicts).sum()
    }
}
