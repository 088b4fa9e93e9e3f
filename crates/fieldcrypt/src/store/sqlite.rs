//! [`SqliteStore`]: both storage collaborators on a single SQLite connection.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use common::SensitiveTable;
use rusqlite::types::{ToSql, ValueRef};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use super::{MetadataStore, RowStore, RowUpdate, StoreError, StoredRow};

/// How long a writer waits for a competing lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Key-value table backing [`MetadataStore`]. Created on first write.
const METADATA_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS fieldcrypt_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// SQLite-backed [`RowStore`] and [`MetadataStore`].
///
/// Access to the connection is serialised with a [`Mutex`], so one store may
/// be shared between the migration and application code.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the file cannot be opened or
    /// configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "sqlite store opened");
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Wrap an existing connection. Nothing is written until the first
    /// [`MetadataStore::put`].
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// Application code uses this for its own reads and writes so that they
    /// interleave safely with a running migration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] or whatever `f` returns.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.lock()?;
        Ok(f(&conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RowStore for SqliteStore {
    fn check_key(&self, table: &SensitiveTable) -> Result<(), StoreError> {
        let sql = format!(
            "SELECT COUNT(*), COUNT(DISTINCT {key}) FROM {name}",
            key = quote(&table.key_column),
            name = quote(&table.name)
        );
        let conn = self.lock()?;
        let (rows, distinct): (i64, i64) =
            conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
        // COUNT(DISTINCT ..) ignores NULLs, so NULL keys also show up here.
        if rows != distinct {
            return Err(StoreError::NonUniqueKey {
                table: table.name.clone(),
                column: table.key_column.clone(),
            });
        }
        Ok(())
    }

    fn scan_batch(
        &self,
        table: &SensitiveTable,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<StoredRow>, StoreError> {
        let sql = select_sql(table, after.is_some());
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&sql)?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<StoredRow> {
            let key: i64 = row.get(0)?;
            let mut values = Vec::with_capacity(table.columns.len());
            for idx in 1..=table.columns.len() {
                values.push(text_value(row.get_ref(idx)?));
            }
            Ok(StoredRow { key, values })
        };

        let rows = match after {
            Some(after) => stmt
                .query_map(rusqlite::params![after, limit], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map(rusqlite::params![limit], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
    }

    fn update_row(&self, table: &SensitiveTable, update: &RowUpdate) -> Result<bool, StoreError> {
        if update.changes.is_empty() {
            return Ok(false);
        }
        for change in &update.changes {
            if !table.columns.iter().any(|c| c == &change.column) {
                return Err(StoreError::UnknownColumn {
                    table: table.name.clone(),
                    column: change.column.clone(),
                });
            }
        }

        let sql = update_sql(table, update);
        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(1 + 2 * update.changes.len());
        params.extend(update.changes.iter().map(|c| &c.replacement as &dyn ToSql));
        params.push(&update.key);
        params.extend(update.changes.iter().map(|c| &c.expected as &dyn ToSql));

        let conn = self.lock()?;
        let affected = conn.prepare_cached(&sql)?.execute(params.as_slice())?;
        Ok(affected > 0)
    }
}

impl MetadataStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        if !metadata_table_exists(&conn)? {
            return Ok(None);
        }
        let value = conn
            .query_row(
                "SELECT value FROM fieldcrypt_metadata WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(METADATA_TABLE_DDL)?;
        conn.execute(
            "INSERT INTO fieldcrypt_metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }
}

fn metadata_table_exists(conn: &Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master
                        WHERE type = 'table' AND name = 'fieldcrypt_metadata')",
        [],
        |row| row.get(0),
    )
}

/// Quote an identifier that the registry has already validated.
fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn select_sql(table: &SensitiveTable, has_cursor: bool) -> String {
    let key = quote(&table.key_column);
    let columns: Vec<String> = table.columns.iter().map(|c| quote(c)).collect();
    let filter = if has_cursor {
        format!("WHERE {key} > ?1 ORDER BY {key} LIMIT ?2")
    } else {
        format!("ORDER BY {key} LIMIT ?1")
    };
    format!(
        "SELECT {key}, {} FROM {} {filter}",
        columns.join(", "),
        quote(&table.name)
    )
}

/// `UPDATE t SET c1 = ?1, .. WHERE key = ?n AND c1 = ?n+1 AND ..`
fn update_sql(table: &SensitiveTable, update: &RowUpdate) -> String {
    let n = update.changes.len();
    let assignments: Vec<String> = update
        .changes
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", quote(&c.column), i + 1))
        .collect();
    let guards: Vec<String> = update
        .changes
        .iter()
        .enumerate()
        .map(|(i, c)| format!(" AND {} = ?{}", quote(&c.column), n + 2 + i))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?{}{}",
        quote(&table.name),
        assignments.join(", "),
        quote(&table.key_column),
        n + 1,
        guards.concat()
    )
}

fn text_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok().map(str::to_owned),
        ValueRef::Null | ValueRef::Integer(_) | ValueRef::Real(_) | ValueRef::Blob(_) => None,
    }
}
