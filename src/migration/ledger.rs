//! Version ledger - the durable record of applied units
//!
//! The ledger lives in the database being migrated, so "what is applied" and
//! "what the schema looks like" travel together through backups and restores.
//! Nothing is cached between calls: every read goes to storage.

use crate::config::{MigrationConfig, DEFAULT_TABLE_NAME};
use crate::migration::state_table::state_table_ddl;
use crate::migration::{LedgerEntry, MigrationError, Version};
use crate::{DbError, SqlExecutor};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;

/// Persistent set of applied versions
pub trait VersionLedger {
    /// Create the bookkeeping structure if it does not exist yet
    ///
    /// Safe to call on every startup, including against an empty database.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the structure cannot be created.
    fn ensure_storage(&self) -> Result<(), DbError>;

    /// Every recorded entry, ascending by version
    ///
    /// # Errors
    ///
    /// Returns `DbError` if storage cannot be read or a row is malformed.
    fn applied_entries(&self) -> Result<Vec<LedgerEntry>, DbError>;

    /// Versions already recorded
    ///
    /// # Errors
    ///
    /// Returns `DbError` if storage cannot be read or a row is malformed.
    fn applied_versions(&self) -> Result<BTreeSet<Version>, DbError> {
        Ok(self
            .applied_entries()?
            .into_iter()
            .map(|entry| entry.version)
            .collect())
    }

    /// Durably append one entry
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the entry cannot be written.
    fn record_applied(&self, entry: &LedgerEntry) -> Result<(), DbError>;
}

/// Ledger stored in a table of the migrated PostgreSQL database
pub struct PostgresLedger<'a> {
    executor: &'a dyn SqlExecutor,
    table_name: String,
}

impl<'a> PostgresLedger<'a> {
    /// Ledger in the default `tidemark_migrations` table
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self {
            executor,
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }

    /// Ledger in the table named by `config`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Config` if the table name is not a plain identifier.
    pub fn from_config(executor: &'a dyn SqlExecutor, config: &MigrationConfig) -> Result<Self, MigrationError> {
        config
            .validate()
            .map_err(|e| MigrationError::Config(e.to_string()))?;
        Ok(Self {
            executor,
            table_name: config.table_name.clone(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// The table name as a quoted identifier, matching the quoted DDL
    ///
    /// Names are validated plain identifiers, so they contain no `"` to escape.
    fn table(&self) -> String {
        format!("\"{}\"", self.table_name)
    }
}

fn component(value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::Parse(format!("version component {value} exceeds BIGINT")))
}

impl VersionLedger for PostgresLedger<'_> {
    fn ensure_storage(&self) -> Result<(), DbError> {
        for statement in state_table_ddl(&self.table_name) {
            self.executor.execute(&statement, &[])?;
        }
        Ok(())
    }

    fn applied_entries(&self) -> Result<Vec<LedgerEntry>, DbError> {
        let sql = format!(
            "SELECT version, name, applied_at, execution_time_ms FROM {} ORDER BY major, minor, patch, version",
            self.table()
        );

        let rows = self.executor.query_all(&sql, &[])?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let version: String = row.try_get(0)?;
            let name: String = row.try_get(1)?;
            let applied_at: NaiveDateTime = row.try_get(2)?;
            let execution_time_ms: Option<i64> = row.try_get(3)?;

            let version = Version::parse(&version)
                .map_err(|e| DbError::Parse(format!("{} row: {e}", self.table_name)))?;
            entries.push(LedgerEntry::new(version, name, applied_at.and_utc(), execution_time_ms));
        }

        // Labels order by string in SQL but by `Version` here; settle on `Version`.
        entries.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(entries)
    }

    fn applied_versions(&self) -> Result<BTreeSet<Version>, DbError> {
        let sql = format!("SELECT version FROM {}", self.table());
        let rows = self.executor.query_all(&sql, &[])?;

        rows.iter()
            .map(|row| -> Result<Version, DbError> {
                let version: String = row.try_get(0)?;
                Version::parse(&version)
                    .map_err(|e| DbError::Parse(format!("{} row: {e}", self.table_name)))
            })
            .collect()
    }

    fn record_applied(&self, entry: &LedgerEntry) -> Result<(), DbError> {
        // A concurrent pass may have recorded the same unit first; the primary key
        // keeps one row and this insert becomes a no-op.
        let sql = format!(
            "INSERT INTO {} (version, major, minor, patch, name, applied_at, execution_time_ms) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (version) DO NOTHING",
            self.table()
        );

        let version = entry.version.to_string();
        let major = component(entry.version.major)?;
        let minor = component(entry.version.minor)?;
        let patch = component(entry.version.patch)?;
        let applied_at = entry.applied_at.naive_utc();

        let inserted = self.executor.execute(
            &sql,
            &[
                &version,
                &major,
                &minor,
                &patch,
                &entry.name,
                &applied_at,
                &entry.execution_time_ms,
            ],
        )?;

        if inserted == 0 {
            log::warn!(
                "Migration {} was already recorded in {} by another process",
                entry.version,
                self.table_name
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingExecutor;
    use chrono::Utc;

    #[test]
    fn test_ensure_storage_is_idempotent_ddl() {
        let executor = RecordingExecutor::new();
        let ledger = PostgresLedger::new(&executor);

        ledger.ensure_storage().unwrap();
        ledger.ensure_storage().unwrap();

        let statements = executor.statements();
        assert_eq!(statements.len(), 4);
        assert!(statements.iter().all(|s| s.contains("IF NOT EXISTS")), "{statements:#?}");
    }

    #[test]
    fn test_empty_table_has_no_versions() {
        let executor = RecordingExecutor::new();
        let ledger = PostgresLedger::new(&executor);

        assert!(ledger.applied_versions().unwrap().is_empty());
        assert!(ledger.applied_entries().unwrap().is_empty());
    }

    #[test]
    fn test_record_applied_inserts_one_row() {
        let executor = RecordingExecutor::new();
        let ledger = PostgresLedger::new(&executor);
        let entry = LedgerEntry::new(Version::new(1, 2, 0), "v1_2_0_AddKeyValidationResult", Utc::now(), Some(12));

        ledger.record_applied(&entry).unwrap();

        let statements = executor.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("INSERT INTO \"tidemark_migrations\""), "{}", statements[0]);
        assert!(statements[0].contains("ON CONFLICT (version) DO NOTHING"));
    }

    #[test]
    fn test_configured_table_name_is_used() {
        let executor = RecordingExecutor::new();
        let config = MigrationConfig {
            table_name: "schema_ledger".to_string(),
            ..MigrationConfig::default()
        };
        let ledger = PostgresLedger::from_config(&executor, &config).unwrap();

        ledger.applied_versions().unwrap();
        assert_eq!(executor.statements(), ["SELECT version FROM \"schema_ledger\""]);
        assert_eq!(ledger.table_name(), "schema_ledger");
    }

    #[test]
    fn test_mixed_case_table_is_named_the_same_everywhere() {
        let executor = RecordingExecutor::new();
        let config = MigrationConfig {
            table_name: "SchemaLedger".to_string(),
            ..MigrationConfig::default()
        };
        let ledger = PostgresLedger::from_config(&executor, &config).unwrap();

        ledger.ensure_storage().unwrap();
        ledger.applied_versions().unwrap();
        ledger.applied_entries().unwrap();
        ledger
            .record_applied(&LedgerEntry::new(Version::new(1, 0, 0), "1.0.0", Utc::now(), None))
            .unwrap();

        let statements = executor.statements();
        assert_eq!(statements.len(), 5, "{statements:#?}");
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS \"SchemaLedger\""), "{}", statements[0]);
        assert!(statements[1].contains("ON \"SchemaLedger\""), "{}", statements[1]);
        assert_eq!(statements[2], "SELECT version FROM \"SchemaLedger\"");
        assert!(statements[3].contains("FROM \"SchemaLedger\" ORDER BY"), "{}", statements[3]);
        assert!(statements[4].starts_with("INSERT INTO \"SchemaLedger\" "), "{}", statements[4]);
        assert!(statements.iter().all(|s| !s.contains(" SchemaLedger")), "{statements:#?}");
    }

    #[test]
    fn test_write_failure_propagates() {
        let executor = RecordingExecutor::new().fail_on("INSERT");
        let ledger = PostgresLedger::new(&executor);
        let entry = LedgerEntry::new(Version::new(1, 0, 0), "1.0.0", Utc::now(), None);

        assert!(ledger.record_applied(&entry).is_err());
    }
}
