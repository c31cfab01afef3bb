//! # Tidemark
//!
//! Versioned, forward-only schema migrations for PostgreSQL services running on
//! the `may` coroutine runtime.
//!
//! A service builds a [`migration::MigrationRegistry`] from its migration units at
//! startup and hands it, together with a borrowed executor, to
//! [`migration::startup_migrations`]. Every unit is applied at most once per
//! database, in ascending version order, and recorded in a ledger table that
//! lives in the migrated database itself.
//!
//! ```rust,no_run
//! use tidemark::{connect, PostgresExecutor};
//! use tidemark::config::TidemarkConfig;
//! use tidemark::migration::{startup_migrations, FnMigration, MigrationRegistry, SchemaManager};
//! use tidemark::DbError;
//!
//! fn add_audit_table(manager: &SchemaManager<'_>) -> Result<(), DbError> {
//!     manager.execute("CREATE TABLE IF NOT EXISTS audit (id BIGSERIAL PRIMARY KEY)", &[])
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TidemarkConfig::load()?;
//!     let registry = MigrationRegistry::new()
//!         .with(FnMigration::new("v1_0_0_AddAuditTable", "creates the audit table", add_audit_table))?;
//!
//!     let executor = PostgresExecutor::new(connect(&config.database.url)?);
//!     startup_migrations(&executor, &registry, &config.migrations)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod executor;
pub mod metrics;
pub mod migration;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

pub use connection::{connect, ConnectionError};
pub use executor::{DbError, PostgresExecutor, SqlExecutor};

// Driver types that appear in the `SqlExecutor` signature.
pub use may_postgres::types::ToSql;
pub use may_postgres::Row;
