//! The persisted "migration completed" flag.

use tracing::info;

use crate::store::{MetadataStore, StoreError};

/// Metadata key holding the completion flag.
pub const ENCRYPTED_KEY: &str = "encrypted";

/// Value stored under [`ENCRYPTED_KEY`] once the migration has finished.
pub const COMPLETED_VALUE: &str = "true";

/// Typed view of the completion flag over any [`MetadataStore`].
///
/// The flag only ever moves from absent (or any other value) to
/// [`COMPLETED_VALUE`].
#[derive(Debug)]
pub struct MigrationMetadataStore<M> {
    store: M,
}

impl<M: MetadataStore> MigrationMetadataStore<M> {
    pub fn new(store: M) -> Self {
        Self { store }
    }

    /// `true` if the flag holds exactly [`COMPLETED_VALUE`].
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the flag cannot be read.
    pub fn is_completed(&self) -> Result<bool, StoreError> {
        Ok(self.store.get(ENCRYPTED_KEY)?.as_deref() == Some(COMPLETED_VALUE))
    }

    /// Record that every registered table has been migrated.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the flag cannot be written.
    pub fn mark_completed(&self) -> Result<(), StoreError> {
        self.store.put(ENCRYPTED_KEY, COMPLETED_VALUE)?;
        info!(key = ENCRYPTED_KEY, "migration marked completed");
        Ok(())
    }
}
