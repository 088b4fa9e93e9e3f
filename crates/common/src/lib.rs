//! Common types and errors shared across `fieldcrypt` crates.

pub mod error;
pub mod registry;
pub mod report;

pub use error::RegistryError;
pub use registry::{Registry, SensitiveTable};
pub use report::{MigrationMode, MigrationReport, TableReport};
