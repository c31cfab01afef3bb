//! Runner - reconciles a registry against a ledger
//!
//! One pass: ensure the ledger exists, read what is applied, diff against the
//! registry, then apply each pending unit in ascending version order and record it
//! immediately after it succeeds. The first failure ends the pass; nothing is
//! rolled back, and the next pass resumes from whatever the ledger says.

use crate::migration::{
    LedgerEntry, MigrationError, MigrationRegistry, MigrationStatus, PendingMigration, RegisteredMigration,
    SchemaManager, VersionLedger,
};
use crate::SqlExecutor;
use chrono::Utc;
use std::cell::Cell;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Where a pass currently is
///
/// `Applying(i)` and `Failed(i)` index into the pending set of that pass.
/// `Failed` is terminal; a retry is a new pass starting from `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    StorageEnsured,
    Diffing,
    Applying(usize),
    Done,
    Failed(usize),
}

/// Outcome of a successful pass
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Units applied by this pass, in order
    pub applied: Vec<LedgerEntry>,
    /// Registered units that were already in the ledger
    pub already_applied: usize,
    /// Pending units left untouched because of a step limit
    pub remaining: usize,
}

impl RunReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Whether the pass changed nothing
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies the pending part of a registry
pub struct Runner<'r> {
    registry: &'r MigrationRegistry,
    phase: Cell<RunPhase>,
}

impl<'r> Runner<'r> {
    pub fn new(registry: &'r MigrationRegistry) -> Self {
        Self {
            registry,
            phase: Cell::new(RunPhase::NotStarted),
        }
    }

    /// Phase the most recent pass ended in (or is in)
    pub fn phase(&self) -> RunPhase {
        self.phase.get()
    }

    fn enter(&self, phase: RunPhase) {
        log::debug!("Migration pass: {:?} -> {:?}", self.phase.get(), phase);
        self.phase.set(phase);
    }

    /// Ensure the ledger exists and compute the pending set
    fn diff(&self, ledger: &dyn VersionLedger) -> Result<(Vec<&'r RegisteredMigration>, usize), MigrationError> {
        self.enter(RunPhase::NotStarted);
        ledger.ensure_storage().map_err(MigrationError::StorageInit)?;
        self.enter(RunPhase::StorageEnsured);

        let applied = ledger.applied_versions().map_err(MigrationError::LedgerRead)?;
        self.enter(RunPhase::Diffing);

        let registry: &'r MigrationRegistry = self.registry;
        let (done, pending): (Vec<&RegisteredMigration>, Vec<&RegisteredMigration>) = registry
            .list()
            .iter()
            .partition(|unit| applied.contains(unit.version()));

        for version in applied.iter().filter(|v| !registry.contains(v)) {
            log::warn!("Ledger records migration {version}, which this build does not know about");
        }

        Ok((pending, done.len()))
    }

    /// Units that a pass would apply, in order, without applying them
    ///
    /// # Errors
    ///
    /// Returns `StorageInit` or `LedgerRead` if the ledger cannot be prepared or read.
    pub fn plan(&self, ledger: &dyn VersionLedger) -> Result<Vec<PendingMigration>, MigrationError> {
        let (pending, _) = self.diff(ledger)?;
        self.enter(RunPhase::Done);
        Ok(pending.into_iter().map(pending_of).collect())
    }

    /// Applied, pending and unknown versions
    ///
    /// # Errors
    ///
    /// Returns `StorageInit` or `LedgerRead` if the ledger cannot be prepared or read.
    pub fn status(&self, ledger: &dyn VersionLedger) -> Result<MigrationStatus, MigrationError> {
        ledger.ensure_storage().map_err(MigrationError::StorageInit)?;
        let entries = ledger.applied_entries().map_err(MigrationError::LedgerRead)?;

        let (applied, unknown): (Vec<LedgerEntry>, Vec<LedgerEntry>) = entries
            .into_iter()
            .partition(|entry| self.registry.contains(&entry.version));

        let pending = self
            .registry
            .list()
            .iter()
            .filter(|unit| !applied.iter().any(|entry| &entry.version == unit.version()))
            .map(pending_of)
            .collect();

        Ok(MigrationStatus::new(applied, pending, unknown))
    }

    /// Apply every pending unit
    ///
    /// # Errors
    ///
    /// - `StorageInit` / `LedgerRead`: nothing was applied.
    /// - `ApplyFailed`: the named unit failed; earlier units stay applied and recorded,
    ///   later ones were not attempted.
    /// - `LedgerWrite`: the named unit applied but is not recorded; the next pass will
    ///   apply it again.
    pub fn run(
        &self,
        executor: &dyn SqlExecutor,
        ledger: &dyn VersionLedger,
    ) -> Result<RunReport, MigrationError> {
        self.run_steps(executor, ledger, None)
    }

    /// Apply at most `steps` pending units (`None` = all)
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub fn run_steps(
        &self,
        executor: &dyn SqlExecutor,
        ledger: &dyn VersionLedger,
        steps: Option<usize>,
    ) -> Result<RunReport, MigrationError> {
        #[cfg(feature = "metrics")]
        METRICS.record_pass();

        let (pending, already_applied) = self.diff(ledger)?;
        let limit = steps.unwrap_or(pending.len()).min(pending.len());

        #[cfg(feature = "tracing")]
        let _pass_span = tracing_helpers::migration_pass_span(limit).entered();

        if pending.is_empty() {
            log::debug!("No pending migrations ({already_applied} already applied)");
        } else {
            log::info!("{} pending migration(s), applying {limit}", pending.len());
        }

        let manager = SchemaManager::new(executor);
        let mut report = RunReport {
            applied: Vec::with_capacity(limit),
            already_applied,
            remaining: pending.len() - limit,
        };

        for (i, unit) in pending.into_iter().take(limit).enumerate() {
            self.enter(RunPhase::Applying(i));
            let entry = self.apply_one(i, unit, &manager, ledger)?;
            report.applied.push(entry);
        }

        self.enter(RunPhase::Done);
        Ok(report)
    }

    fn apply_one(
        &self,
        index: usize,
        unit: &RegisteredMigration,
        manager: &SchemaManager<'_>,
        ledger: &dyn VersionLedger,
    ) -> Result<LedgerEntry, MigrationError> {
        let version = unit.version();

        #[cfg(feature = "tracing")]
        let _unit_span = tracing_helpers::apply_unit_span(&version.to_string(), unit.name()).entered();

        let start = Instant::now();
        if let Err(source) = unit.apply(manager) {
            self.enter(RunPhase::Failed(index));
            log::error!("Migration {} ({}) failed: {source}", version, unit.name());
            #[cfg(feature = "metrics")]
            METRICS.record_failed(&version.to_string());
            return Err(MigrationError::ApplyFailed {
                version: version.clone(),
                name: unit.name().to_string(),
                source,
            });
        }
        let elapsed = start.elapsed();

        let entry = LedgerEntry::new(
            version.clone(),
            unit.name(),
            Utc::now(),
            Some(i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)),
        );

        if let Err(source) = ledger.record_applied(&entry) {
            self.enter(RunPhase::Failed(index));
            log::error!(
                "Migration {} ({}) applied but could not be recorded: {source}",
                version,
                unit.name()
            );
            #[cfg(feature = "metrics")]
            METRICS.record_failed(&version.to_string());
            return Err(MigrationError::LedgerWrite {
                version: version.clone(),
                name: unit.name().to_string(),
                source,
            });
        }

        log::info!("Applied migration {} ({}) in {:?}", version, unit.name(), elapsed);
        #[cfg(feature = "metrics")]
        METRICS.record_applied(&version.to_string(), elapsed);

        Ok(entry)
    }
}

fn pending_of(unit: &RegisteredMigration) -> PendingMigration {
    PendingMigration {
        version: unit.version().clone(),
        name: unit.name().to_string(),
        description: unit.description().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{FnMigration, MemoryLedger, Version};
    use crate::test_helpers::RecordingExecutor;
    use crate::DbError;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Unit that appends its name to `journal` when applied
    fn journaled(name: &str, journal: &Journal) -> FnMigration {
        let journal = Arc::clone(journal);
        let tag = name.to_string();
        FnMigration::new(name, "", move |_manager: &SchemaManager<'_>| {
            journal.lock().unwrap().push(tag.clone());
            Ok(())
        })
    }

    fn failing(name: &str, journal: &Journal) -> FnMigration {
        let journal = Arc::clone(journal);
        let tag = name.to_string();
        FnMigration::new(name, "", move |_manager: &SchemaManager<'_>| {
            journal.lock().unwrap().push(tag.clone());
            Err(DbError::Query("column \"weight\" contains null values".to_string()))
        })
    }

    fn recorded(ledger: &MemoryLedger) -> Vec<String> {
        ledger.entries().iter().map(|e| e.version.to_string()).collect()
    }

    #[test]
    fn test_applies_in_ascending_order() {
        let journal = Journal::default();
        let registry = MigrationRegistry::new()
            .with(journaled("2.0.0", &journal))
            .and_then(|r| r.with(journaled("1.0.0", &journal)))
            .and_then(|r| r.with(journaled("1.1.0", &journal)))
            .unwrap();
        let executor = RecordingExecutor::new();
        let ledger = MemoryLedger::new();

        let report = Runner::new(&registry).run(&executor, &ledger).unwrap();

        assert_eq!(*journal.lock().unwrap(), ["1.0.0", "1.1.0", "2.0.0"]);
        assert_eq!(report.applied_count(), 3);
        assert_eq!(recorded(&ledger), ["1.0.0", "1.1.0", "2.0.0"]);
    }

    #[test]
    fn test_second_pass_applies_nothing() {
        let journal = Journal::default();
        let registry = MigrationRegistry::new()
            .with(journaled("1.0.0", &journal))
            .and_then(|r| r.with(journaled("1.1.0", &journal)))
            .unwrap();
        let executor = RecordingExecutor::new();
        let ledger = MemoryLedger::new();
        let runner = Runner::new(&registry);

        runner.run(&executor, &ledger).unwrap();
        journal.lock().unwrap().clear();

        let report = runner.run(&executor, &ledger).unwrap();
        assert!(report.is_noop());
        assert_eq!(report.already_applied, 2);
        assert!(journal.lock().unwrap().is_empty());
        assert_eq!(ledger.storage_calls(), 2, "storage is ensured on every pass");
    }

    #[test]
    fn test_fail_stop() {
        let journal = Journal::default();
        let registry = MigrationRegistry::new()
            .with(journaled("1.0.0", &journal))
            .and_then(|r| r.with(failing("1.1.0", &journal)))
            .and_then(|r| r.with(journaled("1.2.0", &journal)))
            .unwrap();
        let executor = RecordingExecutor::new();
        let ledger = MemoryLedger::new();
        let runner = Runner::new(&registry);

        let err = runner.run(&executor, &ledger).unwrap_err();

        match &err {
            MigrationError::ApplyFailed { version, source, .. } => {
                assert_eq!(*version, Version::new(1, 1, 0));
                assert!(source.to_string().contains("null values"));
            }
            other => panic!("Expected ApplyFailed, got {other:?}"),
        }
        assert_eq!(*journal.lock().unwrap(), ["1.0.0", "1.1.0"], "1.2.0 is never attempted");
        assert_eq!(recorded(&ledger), ["1.0.0"]);
        assert_eq!(runner.phase(), RunPhase::Failed(1));
    }

    #[test]
    fn test_retry_after_failure_resumes_at_failed_unit() {
        let journal = Journal::default();
        let broken = Arc::new(Mutex::new(true));
        let flag = Arc::clone(&broken);
        let registry = MigrationRegistry::new()
            .with(journaled("1.0.0", &journal))
            .and_then(|r| {
                r.with(FnMigration::new("1.1.0", "", move |_manager: &SchemaManager<'_>| {
                    if *flag.lock().unwrap() {
                        Err(DbError::Query("transient".to_string()))
                    } else {
                        Ok(())
                    }
                }))
            })
            .and_then(|r| r.with(journaled("1.2.0", &journal)))
            .unwrap();
        let executor = RecordingExecutor::new();
        let ledger = MemoryLedger::new();
        let runner = Runner::new(&registry);

        assert!(runner.run(&executor, &ledger).is_err());
        *broken.lock().unwrap() = false;

        let report = runner.run(&executor, &ledger).unwrap();
        let applied: Vec<String> = report.applied.iter().map(|e| e.version.to_string()).collect();
        assert_eq!(applied, ["1.1.0", "1.2.0"]);
        assert_eq!(*journal.lock().unwrap(), ["1.0.0", "1.2.0"], "1.0.0 ran exactly once");
        assert_eq!(runner.phase(), RunPhase::Done);
    }

    #[test]
    fn test_ledger_write_failure_reapplies_idempotent_unit() {
        // Schema modelled as a set of column names; the unit only adds if absent.
        let columns: Arc<Mutex<BTreeSet<String>>> = Arc::default();
        let applies = Arc::new(Mutex::new(0usize));
        let (cols, count) = (Arc::clone(&columns), Arc::clone(&applies));
        let registry = MigrationRegistry::new()
            .with(FnMigration::new("1.2.0", "", move |_manager: &SchemaManager<'_>| {
                *count.lock().unwrap() += 1;
                cols.lock().unwrap().insert("last_validation_status".to_string());
                Ok(())
            }))
            .unwrap();
        let executor = RecordingExecutor::new();
        let ledger = MemoryLedger::new();
        let runner = Runner::new(&registry);

        ledger.fail_next_record();
        let err = runner.run(&executor, &ledger).unwrap_err();
        assert!(matches!(err, MigrationError::LedgerWrite { .. }));
        assert!(ledger.entries().is_empty());

        let report = runner.run(&executor, &ledger).unwrap();
        assert_eq!(report.applied_count(), 1);
        assert_eq!(*applies.lock().unwrap(), 2, "the unrecorded unit runs again");
        assert_eq!(columns.lock().unwrap().len(), 1, "no duplicate schema change");
        assert_eq!(recorded(&ledger), ["1.2.0"]);
    }

    #[test]
    fn test_non_idempotent_unit_surfaces_secondary_error() {
        let columns: Arc<Mutex<BTreeSet<String>>> = Arc::default();
        let cols = Arc::clone(&columns);
        let registry = MigrationRegistry::new()
            .with(FnMigration::new("1.2.0", "", move |_manager: &SchemaManager<'_>| {
                if cols.lock().unwrap().insert("last_validation_status".to_string()) {
                    Ok(())
                } else {
                    Err(DbError::Query(
                        "column \"last_validation_status\" of relation \"api_keys\" already exists".to_string(),
                    ))
                }
            }))
            .unwrap();
        let executor = RecordingExecutor::new();
        let ledger = MemoryLedger::new();
        let runner = Runner::new(&registry);

        ledger.fail_next_record();
        assert!(matches!(
            runner.run(&executor, &ledger),
            Err(MigrationError::LedgerWrite { .. })
        ));

        let err = runner.run(&executor, &ledger).unwrap_err();
        assert!(matches!(err, MigrationError::ApplyFailed { .. }));
        assert!(err.to_string().contains("already exists"));
        assert!(ledger.entries().is_empty(), "the ledger never records a failed apply");
        assert_eq!(columns.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_storage_failure_aborts_before_any_unit() {
        let journal = Journal::default();
        let registry = MigrationRegistry::new().with(journaled("1.0.0", &journal)).unwrap();
        let executor = RecordingExecutor::new();
        let ledger = MemoryLedger::new();
        ledger.set_storage_failure(true);

        let err = Runner::new(&registry).run(&executor, &ledger).unwrap_err();
        assert!(matches!(err, MigrationError::StorageInit(_)));
        assert!(journal.lock().unwrap().is_empty());
    }

    #[test]
    fn test_run_steps_limits_applied_units() {
        let journal = Journal::default();
        let registry = MigrationRegistry::new()
            .with(journaled("1.0.0", &journal))
            .and_then(|r| r.with(journaled("1.1.0", &journal)))
            .and_then(|r| r.with(journaled("1.2.0", &journal)))
            .unwrap();
        let executor = RecordingExecutor::new();
        let ledger = MemoryLedger::new();

        let report = Runner::new(&registry).run_steps(&executor, &ledger, Some(2)).unwrap();
        assert_eq!(report.applied_count(), 2);
        assert_eq!(report.remaining, 1);
        assert_eq!(recorded(&ledger), ["1.0.0", "1.1.0"]);
    }

    #[test]
    fn test_plan_and_status_do_not_apply() {
        let journal = Journal::default();
        let registry = MigrationRegistry::new()
            .with(journaled("1.0.0", &journal))
            .and_then(|r| r.with(journaled("1.1.0", &journal)))
            .unwrap();
        let ledger = MemoryLedger::with_entries([
            LedgerEntry::new(Version::new(1, 0, 0), "1.0.0", Utc::now(), Some(3)),
            LedgerEntry::new(Version::new(3, 0, 0), "v3_0_0_FromNewerBuild", Utc::now(), None),
        ]);
        let runner = Runner::new(&registry);

        let plan = runner.plan(&ledger).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].version, Version::new(1, 1, 0));

        let status = runner.status(&ledger).unwrap();
        assert_eq!(status.applied_count, 1);
        assert_eq!(status.pending_count, 1);
        assert_eq!(status.unknown.len(), 1);
        assert_eq!(status.unknown[0].version, Version::new(3, 0, 0));
        assert_eq!(status.latest_applied_version(), Some(&Version::new(1, 0, 0)));
        assert_eq!(status.next_pending_version(), Some(&Version::new(1, 1, 0)));
        assert!(!status.is_up_to_date());

        assert!(journal.lock().unwrap().is_empty());
    }

    #[test]
    fn test_units_receive_the_lent_executor() {
        let registry = MigrationRegistry::new()
            .with(FnMigration::new("v1_0_0_CreateGroups", "", |manager: &SchemaManager<'_>| {
                manager.execute("CREATE TABLE IF NOT EXISTS groups (id BIGSERIAL PRIMARY KEY)", &[])
            }))
            .unwrap();
        let executor = RecordingExecutor::new();
        let ledger = MemoryLedger::new();

        Runner::new(&registry).run(&executor, &ledger).unwrap();
        assert_eq!(
            executor.statements(),
            ["CREATE TABLE IF NOT EXISTS groups (id BIGSERIAL PRIMARY KEY)"]
        );
    }
}
