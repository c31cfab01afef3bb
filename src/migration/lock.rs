//! Advisory lock held for the duration of a migration pass
//!
//! Session-level `pg_try_advisory_lock` is polled until it succeeds or the timeout
//! runs out. The lock belongs to the connection behind the executor, so the guard
//! must be created on the same executor the pass uses. If the process dies, the
//! server releases the lock with the session.

use crate::migration::MigrationError;
use crate::{DbError, SqlExecutor};
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Releases the advisory lock when dropped
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn SqlExecutor,
    key: i64,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the lock, waiting up to `timeout_seconds`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if another session keeps the lock for the
    /// whole timeout, or `MigrationError::Lock` if the lock query fails.
    pub fn acquire(executor: &'a dyn SqlExecutor, key: i64, timeout_seconds: u64) -> Result<Self, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::acquire_lock_span(key).entered();

        let start = Instant::now();
        let timeout = Duration::from_secs(timeout_seconds);
        let mut announced = false;

        loop {
            if try_acquire(executor, key).map_err(MigrationError::Lock)? {
                log::debug!("Acquired migration lock {key} after {:?}", start.elapsed());
                return Ok(Self { executor, key });
            }

            if start.elapsed() >= timeout {
                return Err(MigrationError::LockTimeout {
                    key,
                    waited_seconds: timeout_seconds,
                });
            }

            if !announced {
                log::info!("Waiting for migration lock {key} held by another process");
                announced = true;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    /// Get a reference to the underlying executor
    pub fn executor(&self) -> &'a dyn SqlExecutor {
        self.executor
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        // Nothing to propagate to from drop; the session drop releases it regardless.
        if let Err(e) = release(self.executor, self.key) {
            log::warn!("Failed to release migration lock {}: {e}", self.key);
        }
    }
}

fn try_acquire(executor: &dyn SqlExecutor, key: i64) -> Result<bool, DbError> {
    let row = executor.query_one("SELECT pg_try_advisory_lock($1)", &[&key])?;
    Ok(row.try_get(0)?)
}

fn release(executor: &dyn SqlExecutor, key: i64) -> Result<(), DbError> {
    executor.query_one("SELECT pg_advisory_unlock($1)", &[&key])?;
    Ok(())
}

/// Whether any session currently holds the advisory lock `key`
///
/// # Errors
///
/// Returns `DbError` if the catalog query fails.
pub fn is_migration_lock_held(executor: &dyn SqlExecutor, key: i64) -> Result<bool, DbError> {
    // Single-argument advisory locks on a bigint key show up as classid/objid halves.
    let row = executor.query_one(
        "SELECT EXISTS (SELECT 1 FROM pg_locks WHERE locktype = 'advisory' AND granted \
         AND objsubid = 1 AND ((classid::bigint << 32) | objid::bigint) = $1)",
        &[&key],
    )?;
    Ok(row.try_get(0)?)
}
