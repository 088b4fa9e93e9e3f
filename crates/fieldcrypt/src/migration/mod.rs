//! One-time bulk encryption of legacy plaintext.
//!
//! [`MigrationOrchestrator::migrate_to_encrypted`] walks every table in the
//! [`Registry`] and encrypts each sensitive value that is not already
//! ciphertext-shaped, then sets the completion flag. It is idempotent: values
//! that already look like ciphertext are never touched, so an interrupted run
//! can simply be started again.
//!
//! # Passes
//!
//! Each table is read in keyset-paginated batches. A row with several
//! plaintext columns gets a single update. Updates are compare-and-swap: if
//! application traffic changed a row between read and write, the update is
//! dropped and counted as a conflict. The concurrent writer already went
//! through [`FieldEncryptor::encrypt`].
//!
//! # Failure
//!
//! Any storage error aborts the remaining tables and leaves the flag unset.
//! Rows migrated before the failure stay encrypted.

pub mod metadata;

pub use metadata::MigrationMetadataStore;

use common::{MigrationMode, MigrationReport, Registry, SensitiveTable, TableReport};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::crypto::{CryptoError, FieldEncryptor};
use crate::store::{ColumnChange, MetadataStore, RowStore, RowUpdate, StoreError, StoredRow};

/// Rows read per batch unless overridden.
pub const DEFAULT_BATCH_SIZE: usize = 500;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that abort a migration or survey.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Migration requested without a passphrase.
    #[error("field encryption is disabled; configure a passphrase before migrating")]
    EncryptionDisabled,

    /// Reading or updating a table failed.
    #[error("migration of table {table} failed: {source}")]
    Table {
        table: String,
        #[source]
        source: StoreError,
    },

    /// Encrypting a value failed.
    #[error("encryption failed while migrating table {table}: {source}")]
    Crypto {
        table: String,
        #[source]
        source: CryptoError,
    },

    /// The completion flag could not be read or written.
    #[error("migration metadata unavailable: {0}")]
    Metadata(#[source] StoreError),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives the migration of every registered table.
#[derive(Debug)]
pub struct MigrationOrchestrator<'a, R, M> {
    encryptor: &'a FieldEncryptor,
    rows: &'a R,
    metadata: MigrationMetadataStore<&'a M>,
    registry: &'a Registry,
    batch_size: usize,
}

impl<'a, R: RowStore, M: MetadataStore> MigrationOrchestrator<'a, R, M> {
    pub fn new(
        encryptor: &'a FieldEncryptor,
        rows: &'a R,
        metadata: MigrationMetadataStore<&'a M>,
        registry: &'a Registry,
    ) -> Self {
        Self {
            encryptor,
            rows,
            metadata,
            registry,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the number of rows read per batch. Values below 1 are
    /// raised to 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Encrypt all legacy plaintext, then set the completion flag.
    ///
    /// Returns immediately, without reading any table, if the flag is
    /// already set.
    ///
    /// # Errors
    ///
    /// - [`MigrationError::EncryptionDisabled`] if the encryptor is disabled.
    /// - [`MigrationError::Table`] naming the first table that failed.
    /// - [`MigrationError::Metadata`] if the flag cannot be read or written.
    pub fn migrate_to_encrypted(&self) -> Result<MigrationReport, MigrationError> {
        if !self.encryptor.is_enabled() {
            return Err(MigrationError::EncryptionDisabled);
        }
        if self.metadata.is_completed().map_err(MigrationError::Metadata)? {
            info!("encryption migration already completed; skipping");
            return Ok(MigrationReport::already_completed());
        }

        info!(
            tables = self.registry.len(),
            batch_size = self.batch_size,
            "starting encryption migration"
        );
        let tables = self.walk(MigrationMode::Apply)?;
        self.metadata.mark_completed().map_err(MigrationError::Metadata)?;

        let report = MigrationReport::completed(MigrationMode::Apply, tables);
        info!(
            values_encrypted = report.values_encrypted(),
            rows_updated = report.rows_updated(),
            conflicts = report.conflicts(),
            "encryption migration completed"
        );
        Ok(report)
    }

    /// Count what [`Self::migrate_to_encrypted`] would encrypt, writing
    /// nothing.
    ///
    /// Ignores the completion flag and works on a disabled encryptor.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Table`] if a table cannot be read.
    pub fn survey(&self) -> Result<MigrationReport, MigrationError> {
        let tables = self.walk(MigrationMode::Survey)?;
        let report = MigrationReport::completed(MigrationMode::Survey, tables);
        info!(
            plaintext_values = report.values_encrypted(),
            "encryption survey completed"
        );
        Ok(report)
    }

    fn walk(&self, mode: MigrationMode) -> Result<Vec<TableReport>, MigrationError> {
        self.registry
            .tables()
            .iter()
            .map(|table| self.process_table(table, mode))
            .collect()
    }

    #[instrument(skip(self, table), fields(table = %table.name))]
    fn process_table(
        &self,
        table: &SensitiveTable,
        mode: MigrationMode,
    ) -> Result<TableReport, MigrationError> {
        let store_err = |source: StoreError| MigrationError::Table {
            table: table.name.clone(),
            source,
        };

        self.rows.check_key(table).map_err(store_err)?;

        let mut report = TableReport::new(&table.name);
        let mut after = None;
        loop {
            let batch = self
                .rows
                .scan_batch(table, after, self.batch_size)
                .map_err(store_err)?;
            let Some(last) = batch.last() else { break };
            after = Some(last.key);

            for row in &batch {
                report.rows_scanned += 1;
                let changes = self.plan_row(table, row, mode, &mut report)?;
                if changes.is_empty() {
                    continue;
                }

                let encrypted = changes.len() as u64;
                let update = RowUpdate {
                    key: row.key,
                    changes,
                };
                if self.rows.update_row(table, &update).map_err(store_err)? {
                    report.rows_updated += 1;
                    report.values_encrypted += encrypted;
                } else {
                    report.conflicts += 1;
                    debug!(key = row.key, "row changed during migration; update skipped");
                }
            }

            if batch.len() < self.batch_size {
                break;
            }
        }

        info!(
            rows_scanned = report.rows_scanned,
            values_encrypted = report.values_encrypted,
            values_skipped = report.values_skipped,
            rows_updated = report.rows_updated,
            conflicts = report.conflicts,
            "table pass finished"
        );
        Ok(report)
    }

    /// Classify the values of one row. In apply mode, returns the changes to
    /// write; in survey mode, counts would-be encryptions and returns none.
    fn plan_row(
        &self,
        table: &SensitiveTable,
        row: &StoredRow,
        mode: MigrationMode,
        report: &mut TableReport,
    ) -> Result<Vec<ColumnChange>, MigrationError> {
        let mut changes = Vec::new();
        for (column, value) in table.columns.iter().zip(&row.values) {
            let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
                continue;
            };
            if self.encryptor.is_encrypted(value) {
                report.values_skipped += 1;
                continue;
            }
            match mode {
                MigrationMode::Survey => report.values_encrypted += 1,
                MigrationMode::Apply => {
                    let replacement =
                        self.encryptor
                            .encrypt(value)
                            .map_err(|source| MigrationError::Crypto {
                                table: table.name.clone(),
                                source,
                            })?;
                    changes.push(ColumnChange {
                        column: column.clone(),
                        expected: value.to_owned(),
                        replacement,
                    });
                }
            }
        }
        Ok(changes)
    }
}
