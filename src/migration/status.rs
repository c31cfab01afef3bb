//! Migration status tracking

use crate::migration::{LedgerEntry, Version};
use serde::Serialize;

/// Applied vs pending, as seen by one registry against one ledger
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Ledger entries for registered units, ascending
    pub applied: Vec<LedgerEntry>,

    /// Registered units not in the ledger, in the order they would run
    pub pending: Vec<PendingMigration>,

    /// Ledger entries with no registered unit (written by a newer build)
    pub unknown: Vec<LedgerEntry>,

    pub applied_count: usize,
    pub pending_count: usize,
}

/// A registered unit that has not been applied yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMigration {
    pub version: Version,
    pub name: String,
    pub description: String,
}

impl MigrationStatus {
    #[must_use]
    pub fn new(applied: Vec<LedgerEntry>, pending: Vec<PendingMigration>, unknown: Vec<LedgerEntry>) -> Self {
        let applied_count = applied.len();
        let pending_count = pending.len();
        Self {
            applied,
            pending,
            unknown,
            applied_count,
            pending_count,
        }
    }

    /// Total number of registered units
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied_count + self.pending_count
    }

    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    #[must_use]
    pub fn latest_applied_version(&self) -> Option<&Version> {
        self.applied.iter().map(|entry| &entry.version).max()
    }

    #[must_use]
    pub fn next_pending_version(&self) -> Option<&Version> {
        self.pending.first().map(|pending| &pending.version)
    }
}
