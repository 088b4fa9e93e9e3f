//! Configuration loading and validation for the migrator.
//!
//! Settings come from `FIELDCRYPT_`-prefixed environment variables. The list
//! of sensitive tables lives in a separate TOML file named by
//! `FIELDCRYPT_TABLES_FILE`.

use std::fmt;

use anyhow::{Context, Result};
use common::{Registry, SensitiveTable};
use serde::Deserialize;

/// Prefix of every environment variable read by [`Config::from_env`].
const ENV_PREFIX: &str = "FIELDCRYPT";

/// Validated migrator configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Operator passphrase. Empty disables field encryption.
    #[serde(default)]
    pub passphrase: String,

    /// Path of the SQLite database to migrate. **Required.**
    pub database_path: String,

    /// Path of the TOML file listing sensitive tables. **Required.**
    pub tables_file: String,

    /// Rows read per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Count plaintext values without writing anything.
    #[serde(default)]
    pub dry_run: bool,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_batch_size() -> usize {
    fieldcrypt::migration::DEFAULT_BATCH_SIZE
}
fn default_log_level() -> String {
    "info".into()
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passphrase = if self.passphrase.is_empty() {
            "<empty>"
        } else {
            "[REDACTED]"
        };
        f.debug_struct("Config")
            .field("passphrase", &passphrase)
            .field("database_path", &self.database_path)
            .field("tables_file", &self.tables_file)
            .field("batch_size", &self.batch_size)
            .field("dry_run", &self.dry_run)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_source(env: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(env)
            .build()
            .context("failed to build migrator configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise migrator configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.database_path, "FIELDCRYPT_DATABASE_PATH")?;
        ensure_non_empty(&self.tables_file, "FIELDCRYPT_TABLES_FILE")?;

        if self.batch_size == 0 {
            anyhow::bail!("FIELDCRYPT_BATCH_SIZE must be > 0");
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sensitive-table registry file
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    tables: Vec<SensitiveTable>,
}

/// Load and validate the `[[tables]]` list from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if any entry is
/// invalid.
pub fn load_registry(path: &str) -> Result<Registry> {
    let file = config::Config::builder()
        .add_source(config::File::new(path, config::FileFormat::Toml))
        .build()
        .with_context(|| format!("failed to read sensitive-table registry {path}"))?;

    let parsed: RegistryFile = file
        .try_deserialize()
        .with_context(|| format!("failed to parse sensitive-table registry {path}"))?;

    let registry = Registry::new(parsed.tables)
        .with_context(|| format!("invalid sensitive-table registry {path}"))?;
    if registry.is_empty() {
        anyhow::bail!("sensitive-table registry {path} lists no tables");
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    fn valid() -> Config {
        Config {
            passphrase: "correct-horse".into(),
            database_path: "/var/lib/app/app.db".into(),
            tables_file: "/etc/app/sensitive-tables.toml".into(),
            batch_size: default_batch_size(),
            dry_run: false,
            log_level: default_log_level(),
        }
    }

    fn registry_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_batch_size(), 500);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn loads_from_prefixed_environment() {
        let cfg = Config::from_source(env(&[
            ("FIELDCRYPT_DATABASE_PATH", "/tmp/app.db"),
            ("FIELDCRYPT_TABLES_FILE", "/tmp/tables.toml"),
            ("FIELDCRYPT_BATCH_SIZE", "64"),
            ("FIELDCRYPT_DRY_RUN", "true"),
        ]))
        .unwrap();

        assert_eq!(cfg.database_path, "/tmp/app.db");
        assert_eq!(cfg.tables_file, "/tmp/tables.toml");
        assert_eq!(cfg.batch_size, 64);
        assert!(cfg.dry_run);
        assert!(cfg.passphrase.is_empty());
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn missing_database_path_is_rejected() {
        let result = Config::from_source(env(&[("FIELDCRYPT_TABLES_FILE", "/tmp/tables.toml")]));
        assert!(result.is_err());
    }

    #[test]
    fn validate_accepts_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_database_path() {
        let cfg = Config {
            database_path: "  ".into(),
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let cfg = Config {
            batch_size: 0,
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_redacts_passphrase() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("correct-horse"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn loads_registry_file() {
        let file = registry_file(
            r#"
            [[tables]]
            name = "messages"
            columns = ["body", "subject"]

            [[tables]]
            name = "contacts"
            key_column = "id"
            columns = ["phone"]
            "#,
        );
        let registry = load_registry(file.path().to_str().unwrap()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tables()[0].name, "messages");
        assert_eq!(registry.tables()[0].key_column, "rowid");
        assert_eq!(registry.tables()[1].key_column, "id");
    }

    #[test]
    fn registry_with_bad_identifier_is_rejected() {
        let file = registry_file(
            r#"
            [[tables]]
            name = "messages; DROP TABLE users"
            columns = ["body"]
            "#,
        );
        assert!(load_registry(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn empty_registry_is_rejected() {
        let file = registry_file("");
        assert!(load_registry(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn missing_registry_file_is_rejected() {
        assert!(load_registry("/nonexistent/sensitive-tables.toml").is_err());
    }
}
