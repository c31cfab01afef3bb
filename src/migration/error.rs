//! Migration-specific error types

use crate::migration::Version;
use crate::DbError;

/// Everything that can stop a registry from being built or a pass from finishing
///
/// Registration errors (`InvalidVersion`, `InvalidName`, `DuplicateVersion`) are raised while the
/// registry is constructed, before any database access. The rest abort a pass;
/// units applied before the failure stay applied and recorded.
#[derive(Debug)]
pub enum MigrationError {
    /// A unit's name carries no parseable version
    InvalidVersion { input: String, reason: String },
    /// A unit's name cannot be recorded in the ledger
    InvalidName { name: String, reason: String },
    /// Two units declare the same version
    DuplicateVersion {
        version: Version,
        existing: String,
        rejected: String,
    },
    /// The ledger table could not be created
    StorageInit(DbError),
    /// The ledger could not be read
    LedgerRead(DbError),
    /// A unit's apply function failed
    ApplyFailed {
        version: Version,
        name: String,
        source: DbError,
    },
    /// A unit applied but recording it failed; it will be re-applied next pass
    LedgerWrite {
        version: Version,
        name: String,
        source: DbError,
    },
    /// The advisory lock was not acquired in time
    LockTimeout { key: i64, waited_seconds: u64 },
    /// The advisory lock query itself failed
    Lock(DbError),
    /// Migration settings cannot be used
    Config(String),
}

impl MigrationError {
    /// The version of the unit the error is about, if any
    #[must_use]
    pub fn version(&self) -> Option<&Version> {
        match self {
            MigrationError::DuplicateVersion { version, .. }
            | MigrationError::ApplyFailed { version, .. }
            | MigrationError::LedgerWrite { version, .. } => Some(version),
            _ => None,
        }
    }

    /// Whether this is a registration problem (the pass never touched the database)
    #[must_use]
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            MigrationError::InvalidVersion { .. }
                | MigrationError::InvalidName { .. }
                | MigrationError::DuplicateVersion { .. }
        )
    }
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::InvalidVersion { input, reason } => {
                write!(f, "Invalid migration version '{input}': {reason}")
            }
            MigrationError::InvalidName { name, reason } => {
                write!(f, "Invalid migration name '{name}': {reason}")
            }
            MigrationError::DuplicateVersion {
                version,
                existing,
                rejected,
            } => {
                write!(
                    f,
                    "Migration version {version} is declared twice: '{existing}' is already registered, \
                     '{rejected}' was rejected"
                )
            }
            MigrationError::StorageInit(e) => {
                write!(f, "Failed to initialize migration ledger: {e}")
            }
            MigrationError::LedgerRead(e) => {
                write!(f, "Failed to read applied migrations: {e}")
            }
            MigrationError::ApplyFailed {
                version,
                name,
                source,
            } => {
                write!(f, "Migration '{name}' (version {version}) failed: {source}")
            }
            MigrationError::LedgerWrite {
                version,
                name,
                source,
            } => {
                write!(
                    f,
                    "Migration '{name}' (version {version}) was applied but could not be recorded: {source}\n\
                     It will be applied again on the next run."
                )
            }
            MigrationError::LockTimeout {
                key,
                waited_seconds,
            } => {
                write!(
                    f,
                    "Migration lock timeout: advisory lock {key} not acquired within {waited_seconds} seconds.\n\
                     Another process may be running migrations. If this persists, look for a stuck \
                     session holding it: SELECT pid FROM pg_locks WHERE locktype = 'advisory'"
                )
            }
            MigrationError::Lock(e) => write!(f, "Failed to acquire migration lock: {e}"),
            MigrationError::Config(msg) => write!(f, "Invalid migration configuration: {msg}"),
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::StorageInit(e)
            | MigrationError::LedgerRead(e)
            | MigrationError::Lock(e)
            | MigrationError::ApplyFailed { source: e, .. }
            | MigrationError::LedgerWrite { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

impl From<crate::migration::VersionError> for MigrationError {
    fn from(error: crate::migration::VersionError) -> Self {
        MigrationError::InvalidVersion {
            input: error.input,
            reason: error.reason,
        }
    }
}
