//! `fieldcrypt-migrate`: startup migration entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from `FIELDCRYPT_*` environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Derive the field key and self-test it.
//! 4. Load the sensitive-table registry and open the database.
//! 5. Survey or migrate, then print the report as JSON on stdout.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use fieldcrypt::{FieldEncryptor, MigrationMetadataStore, MigrationOrchestrator, SqliteStore};
use tracing::{info, warn};

use config::Config;

fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %cfg.database_path,
        dry_run = cfg.dry_run,
        "fieldcrypt-migrate starting"
    );

    // -----------------------------------------------------------------------
    // 3. Field encryption
    // -----------------------------------------------------------------------
    let encryptor =
        FieldEncryptor::new(&cfg.passphrase).context("failed to initialise field encryption")?;
    encryptor
        .validate_key()
        .context("field encryption key self-test failed")?;

    // -----------------------------------------------------------------------
    // 4. Registry and storage
    // -----------------------------------------------------------------------
    let registry = config::load_registry(&cfg.tables_file)?;
    info!(tables = registry.len(), "sensitive-table registry loaded");

    let store = SqliteStore::open(&cfg.database_path)
        .with_context(|| format!("failed to open database {}", cfg.database_path))?;

    // -----------------------------------------------------------------------
    // 5. Migration
    // -----------------------------------------------------------------------
    let orchestrator = MigrationOrchestrator::new(
        &encryptor,
        &store,
        MigrationMetadataStore::new(&store),
        &registry,
    )
    .with_batch_size(cfg.batch_size);

    let report = if cfg.dry_run {
        orchestrator.survey().context("encryption survey failed")?
    } else if !encryptor.is_enabled() {
        warn!("no passphrase configured; stored values remain plaintext");
        return Ok(());
    } else {
        orchestrator
            .migrate_to_encrypted()
            .context("encryption migration failed")?
    };

    let json = serde_json::to_string_pretty(&report).context("failed to serialise report")?;
    println!("{json}");
    Ok(())
}
