//! `fieldcrypt`: field-level encryption at rest.
//!
//! - [`crypto`]: passphrase-derived key and [`FieldEncryptor`], used by every
//!   code path that persists or loads a sensitive text column.
//! - [`store`]: the storage capabilities the migration consumes, with a
//!   SQLite implementation.
//! - [`migration`]: the one-time, resumable encryption of legacy plaintext.
//!
//! Typical startup:
//!
//! ```no_run
//! use common::{Registry, SensitiveTable};
//! use fieldcrypt::{FieldEncryptor, MigrationMetadataStore, MigrationOrchestrator, SqliteStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let encryptor = FieldEncryptor::new("correct-horse")?;
//! encryptor.validate_key()?;
//!
//! let store = SqliteStore::open("app.db")?;
//! let registry = Registry::new(vec![SensitiveTable::new("messages", ["body"])])?;
//! MigrationOrchestrator::new(&encryptor, &store, MigrationMetadataStore::new(&store), &registry)
//!     .migrate_to_encrypted()?;
//!
//! let stored = encryptor.encrypt("meet me at dawn")?;
//! assert_eq!(encryptor.decrypt(&stored), "meet me at dawn");
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod migration;
pub mod store;

pub use crypto::{Classification, CryptoError, Decrypted, FieldEncryptor};
pub use migration::{MigrationError, MigrationMetadataStore, MigrationOrchestrator};
pub use store::{MetadataStore, RowStore, SqliteStore, StoreError};
