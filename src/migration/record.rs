//! `LedgerEntry` - one row of the migration ledger

use crate::migration::Version;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Proof that a unit was applied
///
/// Created once by the runner right after the unit's `up()` succeeds, and never
/// updated or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub version: Version,

    /// Declared name of the unit at the time it ran
    pub name: String,

    pub applied_at: DateTime<Utc>,

    /// How long `up()` took (`None` for rows written by other tools)
    pub execution_time_ms: Option<i64>,
}

impl LedgerEntry {
    #[must_use]
    pub fn new(
        version: Version,
        name: impl Into<String>,
        applied_at: DateTime<Utc>,
        execution_time_ms: Option<i64>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            applied_at,
            execution_time_ms,
        }
    }
}
