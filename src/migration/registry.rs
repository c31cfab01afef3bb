//! Migration registry
//!
//! The registry is an ordinary value built during process initialization and lent
//! to the [`Runner`](crate::migration::Runner). There is no global registration
//! table: two registries never interfere, and duplicate detection happens at the
//! moment a unit is added.

use crate::migration::{Migration, MigrationError, SchemaManager, Version};
use crate::DbError;
use std::fmt;
use std::sync::Arc;

/// Longest unit name the ledger's `name` column holds
pub const MAX_NAME_LEN: usize = 255;

/// A unit together with the version parsed from it at registration time
#[derive(Clone)]
pub struct RegisteredMigration {
    version: Version,
    migration: Arc<dyn Migration>,
}

impl RegisteredMigration {
    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn name(&self) -> &str {
        self.migration.name()
    }

    pub fn description(&self) -> &str {
        self.migration.description()
    }

    /// Run the unit's `up()`
    ///
    /// # Errors
    ///
    /// Propagates the unit's own `DbError`.
    pub fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), DbError> {
        self.migration.up(manager)
    }
}

impl fmt::Debug for RegisteredMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredMigration")
            .field("version", &self.version)
            .field("name", &self.name())
            .finish()
    }
}

/// Ordered collection of migration units, unique by version
#[derive(Debug, Default, Clone)]
pub struct MigrationRegistry {
    // Always sorted ascending by version.
    units: Vec<RegisteredMigration>,
}

impl MigrationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of units in one call
    ///
    /// # Errors
    ///
    /// Fails on the first unit whose version is malformed or already taken.
    pub fn from_migrations<I>(migrations: I) -> Result<Self, MigrationError>
    where
        I: IntoIterator<Item = Box<dyn Migration>>,
    {
        let mut registry = Self::new();
        for migration in migrations {
            registry.register_shared(Arc::from(migration))?;
        }
        Ok(registry)
    }

    /// Builder form of [`register`](Self::register)
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn with<M: Migration + 'static>(mut self, migration: M) -> Result<Self, MigrationError> {
        self.register(migration)?;
        Ok(self)
    }

    /// Add a unit
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` if the unit's version cannot be
    /// determined or stored, `MigrationError::InvalidName` if its name does not fit
    /// the ledger, or `MigrationError::DuplicateVersion` if another unit already
    /// uses the version. The registry is unchanged on error.
    pub fn register<M: Migration + 'static>(&mut self, migration: M) -> Result<(), MigrationError> {
        self.register_shared(Arc::new(migration))
    }

    /// Add a unit that is already behind an `Arc`
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_shared(&mut self, migration: Arc<dyn Migration>) -> Result<(), MigrationError> {
        let version = migration.version()?;
        // `Migration::version` may be overridden, so check what it returned.
        version.ensure_storable()?;

        let name_len = migration.name().chars().count();
        if name_len > MAX_NAME_LEN {
            return Err(MigrationError::InvalidName {
                name: migration.name().to_string(),
                reason: format!("{name_len} characters long (max {MAX_NAME_LEN})"),
            });
        }

        if let Some(existing) = self.get(&version) {
            return Err(MigrationError::DuplicateVersion {
                version,
                existing: existing.name().to_string(),
                rejected: migration.name().to_string(),
            });
        }

        log::debug!("Registered migration {} ({})", version, migration.name());
        let at = self.units.partition_point(|unit| unit.version <= version);
        self.units.insert(at, RegisteredMigration { version, migration });
        Ok(())
    }

    /// All units, ascending by version
    pub fn list(&self) -> &[RegisteredMigration] {
        &self.units
    }

    pub fn get(&self, version: &Version) -> Option<&RegisteredMigration> {
        self.units
            .binary_search_by(|unit| unit.version.cmp(version))
            .ok()
            .map(|i| &self.units[i])
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.get(version).is_some()
    }

    /// All registered versions, ascending
    pub fn versions(&self) -> Vec<Version> {
        self.units.iter().map(|unit| unit.version.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
