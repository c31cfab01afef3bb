//! In-process ledger
//!
//! `MemoryLedger` keeps entries in a map for the lifetime of the value. It is meant
//! for embedding tests and dry runs; it is not durable across restarts. Failures
//! can be injected to exercise the runner's crash window.

use crate::migration::{LedgerEntry, Version, VersionLedger};
use crate::DbError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<BTreeMap<Version, LedgerEntry>>,
    fail_storage: AtomicBool,
    fail_next_record: AtomicBool,
    storage_calls: AtomicUsize,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger that already holds `entries`
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = LedgerEntry>) -> Self {
        let ledger = Self::new();
        if let Ok(mut map) = ledger.entries.lock() {
            for entry in entries {
                map.insert(entry.version.clone(), entry);
            }
        }
        ledger
    }

    /// Make every `ensure_storage` call fail until cleared
    pub fn set_storage_failure(&self, fail: bool) {
        self.fail_storage.store(fail, Ordering::SeqCst);
    }

    /// Make the next `record_applied` call fail once
    pub fn fail_next_record(&self) {
        self.fail_next_record.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the recorded entries, ascending by version
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    /// How many times `ensure_storage` was called
    pub fn storage_calls(&self) -> usize {
        self.storage_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<Version, LedgerEntry>>, DbError> {
        self.entries
            .lock()
            .map_err(|e| DbError::Other(format!("memory ledger poisoned: {e}")))
    }
}

impl VersionLedger for MemoryLedger {
    fn ensure_storage(&self) -> Result<(), DbError> {
        self.storage_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_storage.load(Ordering::SeqCst) {
            return Err(DbError::Other("ledger storage unavailable".to_string()));
        }
        Ok(())
    }

    fn applied_entries(&self) -> Result<Vec<LedgerEntry>, DbError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn record_applied(&self, entry: &LedgerEntry) -> Result<(), DbError> {
        if self.fail_next_record.swap(false, Ordering::SeqCst) {
            return Err(DbError::Other(format!(
                "injected ledger write failure for {}",
                entry.version
            )));
        }
        self.lock()?
            .entry(entry.version.clone())
            .or_insert_with(|| entry.clone());
        Ok(())
    }
}
