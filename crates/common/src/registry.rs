//! Registry of tables and columns that hold sensitive text.
//!
//! The migration walks exactly the tables listed here, in order. Names are
//! interpolated into SQL by the storage layer, so every identifier is checked
//! against `[A-Za-z_][A-Za-z0-9_]*` when the registry is built.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Implicit integer key available on every ordinary SQLite table.
pub const DEFAULT_KEY_COLUMN: &str = "rowid";

fn default_key_column() -> String {
    DEFAULT_KEY_COLUMN.into()
}

/// One table with the columns that must be stored encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveTable {
    /// Table name.
    pub name: String,

    /// Integer column used to order and address rows.
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Text columns holding sensitive values.
    pub columns: Vec<String>,
}

impl SensitiveTable {
    /// Describe a table addressed by its implicit `rowid`.
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            key_column: default_key_column(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Use `key_column` instead of `rowid` to address rows.
    pub fn with_key_column(mut self, key_column: impl Into<String>) -> Self {
        self.key_column = key_column.into();
        self
    }

    /// Check identifiers and column list.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] found.
    pub fn validate(&self) -> Result<(), RegistryError> {
        ensure_identifier(&self.name)?;
        ensure_identifier(&self.key_column)?;

        if self.columns.is_empty() {
            return Err(RegistryError::NoColumns(self.name.clone()));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            ensure_identifier(column)?;
            if column.eq_ignore_ascii_case(&self.key_column) {
                return Err(RegistryError::KeyIsSensitive {
                    table: self.name.clone(),
                    column: column.clone(),
                });
            }
            if !seen.insert(column.to_ascii_lowercase()) {
                return Err(RegistryError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Validated, ordered list of [`SensitiveTable`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Registry {
    tables: Vec<SensitiveTable>,
}

impl Registry {
    /// Build a registry, validating every entry.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if any table is invalid or a table name is
    /// registered twice (case-insensitively, as SQLite compares identifiers).
    pub fn new(tables: Vec<SensitiveTable>) -> Result<Self, RegistryError> {
        let mut names = HashSet::new();
        for table in &tables {
            table.validate()?;
            if !names.insert(table.name.to_ascii_lowercase()) {
                return Err(RegistryError::DuplicateTable(table.name.clone()));
            }
        }
        Ok(Self { tables })
    }

    /// Tables in processing order.
    pub fn tables(&self) -> &[SensitiveTable] {
        &self.tables
    }

    /// Return the number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Return `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn ensure_identifier(name: &str) -> Result<(), RegistryError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidIdentifier(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_defaults_to_rowid() {
        let t = SensitiveTable::new("messages", ["body"]);
        assert_eq!(t.key_column, "rowid");
        assert_eq!(t.columns, vec!["body".to_string()]);
    }

    #[test]
    fn accepts_valid_registry() {
        let registry = Registry::new(vec![
            SensitiveTable::new("messages", ["body", "subject"]),
            SensitiveTable::new("contacts", ["phone"]).with_key_column("id"),
        ])
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.tables()[1].key_column, "id");
    }

    #[test]
    fn rejects_injection_in_table_name() {
        let err = Registry::new(vec![SensitiveTable::new("users; DROP TABLE x", ["a"])])
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidIdentifier(_)));
    }

    #[test]
    fn rejects_bad_column_names() {
        for bad in ["", "1col", "col-name", "col name", "\"q\""] {
            let t = SensitiveTable::new("t", [bad]);
            assert!(t.validate().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_empty_column_list() {
        let t = SensitiveTable::new("t", Vec::<String>::new());
        assert_eq!(t.validate(), Err(RegistryError::NoColumns("t".into())));
    }

    #[test]
    fn rejects_duplicate_columns_case_insensitively() {
        let t = SensitiveTable::new("t", ["body", "BODY"]);
        assert!(matches!(
            t.validate(),
            Err(RegistryError::DuplicateColumn { .. })
        ));
    }

    #[test]
    fn rejects_key_column_listed_as_sensitive() {
        let t = SensitiveTable::new("t", ["id", "body"]).with_key_column("id");
        assert!(matches!(
            t.validate(),
            Err(RegistryError::KeyIsSensitive { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_tables() {
        let err = Registry::new(vec![
            SensitiveTable::new("messages", ["body"]),
            SensitiveTable::new("Messages", ["subject"]),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTable("Messages".into()));
    }

    #[test]
    fn deserialises_with_default_key_column() {
        let t: SensitiveTable =
            serde_json::from_str(r#"{"name":"notes","columns":["text"]}"#).unwrap();
        assert_eq!(t.key_column, DEFAULT_KEY_COLUMN);
    }
}
