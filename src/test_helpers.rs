//! Test doubles for code that runs migrations
//!
//! Compiled for this crate's unit tests, and for other crates with the
//! `test-utils` feature.

use crate::{DbError, Row, SqlExecutor, ToSql};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Executor that records every statement and returns no rows
///
/// Statements containing a `fail_on` pattern are recorded and then fail.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    statements: Mutex<Vec<String>>,
    fail_patterns: Vec<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.fail_patterns.push(pattern.to_string());
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.log().clone()
    }

    /// Recorded statements that change the schema
    pub fn ddl(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| {
                let head = s.trim_start().to_ascii_uppercase();
                head.starts_with("CREATE") || head.starts_with("ALTER") || head.starts_with("DROP")
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log().clear();
    }

    fn log(&self) -> MutexGuard<'_, Vec<String>> {
        // A test that panicked mid-record still leaves a usable log.
        self.statements.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, query: &str) -> Result<(), DbError> {
        self.log().push(query.trim().to_string());
        match self.fail_patterns.iter().find(|p| query.contains(p.as_str())) {
            Some(pattern) => Err(DbError::Query(format!("injected failure for {pattern}"))),
            None => Ok(()),
        }
    }
}

impl SqlExecutor for RecordingExecutor {
    fn execute(&self, query: &str, _params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.record(query).map(|()| 0)
    }

    fn query_one(&self, query: &str, _params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.record(query)?;
        Err(DbError::Other("recording executor returns no rows".to_string()))
    }

    fn query_all(&self, query: &str, _params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.record(query).map(|()| Vec::new())
    }
}
