//! Migration system
//!
//! - [`Migration`] / [`FnMigration`]: a versioned, forward-only unit of schema change
//! - [`MigrationRegistry`]: the ordered set of units a build knows about
//! - [`VersionLedger`] / [`PostgresLedger`]: which versions a database has applied
//! - [`Runner`]: applies the difference, in order, recording each success
//! - [`SchemaManager`] / [`TableShape`]: idempotent DDL for unit bodies
//! - [`startup_migrations`]: the one call a service makes before serving
//!
//! # Example
//!
//! ```rust,no_run
//! use sea_query::ColumnDef;
//! use tidemark::migration::{Migration, MigrationRegistry, MemoryLedger, Runner, SchemaManager, Version, VersionError};
//! use tidemark::{DbError, PostgresExecutor};
//!
//! pub struct AddGroupWeights;
//!
//! impl Migration for AddGroupWeights {
//!     fn name(&self) -> &str {
//!         "v1_1_0_AddGroupWeights"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "adds groups.weight for weighted key selection"
//!     }
//!
//!     fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
//!         manager.add_column("groups", ColumnDef::new("weight").integer().not_null().default(1).to_owned())
//!     }
//! }
//!
//! # fn run(executor: &PostgresExecutor) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = MigrationRegistry::new().with(AddGroupWeights)?;
//! let ledger = tidemark::migration::PostgresLedger::new(executor);
//! let report = Runner::new(&registry).run(executor, &ledger)?;
//! println!("applied {}", report.applied_count());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod ledger;
pub mod lock;
pub mod memory_ledger;
pub mod migration;
pub mod record;
pub mod registry;
pub mod runner;
pub mod schema_manager;
pub mod shape;
pub mod startup;
pub mod state_table;
pub mod status;
pub mod version;

pub use error::MigrationError;
pub use ledger::{PostgresLedger, VersionLedger};
pub use lock::{is_migration_lock_held, MigrationLockGuard};
pub use memory_ledger::MemoryLedger;
pub use migration::{FnMigration, Migration};
pub use record::LedgerEntry;
pub use registry::{MigrationRegistry, RegisteredMigration};
pub use runner::{RunPhase, RunReport, Runner};
pub use schema_manager::SchemaManager;
pub use shape::TableShape;
pub use startup::startup_migrations;
pub use state_table::{create_state_table, create_state_table_index};
pub use status::{MigrationStatus, PendingMigration};
pub use version::{parse_unit_name, UnitName, Version, VersionError};

// Re-export for convenience
pub use crate::DbError;
