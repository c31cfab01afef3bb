//! Migration unit definition

use super::schema_manager::SchemaManager;
use super::version::{Version, VersionError};
use crate::DbError;
use std::fmt;

/// Trait that every migration unit implements
///
/// A unit is immutable once registered. Its version is read from [`name`](Migration::name)
/// unless [`version`](Migration::version) is overridden.
///
/// # Idempotence
///
/// The runner records a unit only *after* `up()` succeeds. If the process dies (or the
/// ledger write fails) between the two, the unit runs again on the next pass, and two
/// service instances starting together may both run it. `up()` must therefore be safe
/// to repeat: prefer the "ensure present" helpers on [`SchemaManager`]
/// (`CREATE TABLE IF NOT EXISTS`, `ADD COLUMN IF NOT EXISTS`) over unconditional DDL.
///
/// Migrations are synchronous; inside a `may` coroutine the executor yields on I/O.
pub trait Migration: Send + Sync {
    /// Declared name, e.g. `v1_2_0_AddKeyValidationResult`
    fn name(&self) -> &str;

    /// Version identifier; parsed from [`name`](Migration::name) by default
    ///
    /// # Errors
    ///
    /// Returns `VersionError` if the name does not carry a version.
    fn version(&self) -> Result<Version, VersionError> {
        Version::parse(self.name())
    }

    /// Human-readable summary shown by status output
    fn description(&self) -> &str {
        ""
    }

    /// Apply the schema change
    ///
    /// # Errors
    ///
    /// Returns the `DbError` of the first failing statement.
    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError>;
}

type ApplyFn = dyn Fn(&SchemaManager<'_>) -> Result<(), DbError> + Send + Sync;

/// A unit backed by a plain function or closure
///
/// ```rust
/// use tidemark::migration::{FnMigration, Migration, SchemaManager, Version};
/// use tidemark::DbError;
///
/// fn v1_1_0_add_group_weights(manager: &SchemaManager<'_>) -> Result<(), DbError> {
///     manager.execute("ALTER TABLE groups ADD COLUMN IF NOT EXISTS weight INTEGER", &[])
/// }
///
/// let unit = FnMigration::new("v1_1_0_AddGroupWeights", "adds groups.weight", v1_1_0_add_group_weights);
/// assert_eq!(unit.version().unwrap(), Version::new(1, 1, 0));
/// ```
pub struct FnMigration {
    name: String,
    description: String,
    apply: Box<ApplyFn>,
}

impl FnMigration {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&SchemaManager<'_>) -> Result<(), DbError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            apply: Box::new(apply),
        }
    }
}

impl Migration for FnMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn up(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        (self.apply)(manager)
    }
}

impl fmt::Debug for FnMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMigration")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
