// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! A configurable mock database for tests.
//!
//! Records every executed statement, supports error injection (fail the
//! next N attempts, or fail permanently) and serves canned select rows.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use ribsink_core::error::{DbError, DbResult};

use crate::{Database, Row};

/// A mock [`Database`] that records interactions.
#[derive(Debug, Default)]
pub struct MockDatabase {
    /// Statements successfully "executed", in order.
    executed: Mutex<Vec<String>>,
    /// Rows returned by every select.
    select_rows: Mutex<Vec<Row>>,
    /// Successful update count.
    update_count: AtomicU64,
    /// Select count.
    select_count: AtomicU64,
    /// Total attempts including failed ones.
    attempt_count: AtomicU64,
    /// Number of upcoming attempts to fail transiently.
    fail_attempts: AtomicU32,
    /// Fail every attempt with a permanent error.
    fail_permanent: AtomicBool,
    /// Simulated per-update latency in milliseconds.
    latency_ms: AtomicU64,
}

impl MockDatabase {
    /// Creates a mock that succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `n` attempts with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.fail_attempts.store(n, Ordering::SeqCst);
    }

    /// Makes every attempt fail with a permanent error.
    pub fn set_fail_permanent(&self, fail: bool) {
        self.fail_permanent.store(fail, Ordering::SeqCst);
    }

    /// Simulates a slow database: every update sleeps this long first.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sets the rows returned by subsequent selects.
    pub fn set_select_rows(&self, rows: Vec<Row>) {
        *self.select_rows.lock().unwrap() = rows;
    }

    /// Returns the successfully executed statements.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Returns the number of successful updates.
    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::SeqCst)
    }

    /// Returns the number of selects served.
    pub fn select_count(&self) -> u64 {
        self.select_count.load(Ordering::SeqCst)
    }

    /// Returns the total attempts, including failed ones.
    pub fn attempt_count(&self) -> u64 {
        self.attempt_count.load(Ordering::SeqCst)
    }

    fn try_attempt(&self) -> DbResult<()> {
        self.attempt_count.fetch_add(1, Ordering::SeqCst);

        if self.fail_permanent.load(Ordering::SeqCst) {
            return Err(DbError::execute("injected permanent failure", Some("42601".into())));
        }

        let remaining = self.fail_attempts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_attempts.store(remaining - 1, Ordering::SeqCst);
            return Err(DbError::execute("injected deadlock", Some("40P01".into())));
        }

        Ok(())
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn update(&self, sql: &str, retries: u32) -> DbResult<u64> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.try_attempt() {
                Ok(()) => {
                    self.executed.lock().unwrap().push(sql.to_string());
                    self.update_count.fetch_add(1, Ordering::SeqCst);
                    return Ok(1);
                }
                Err(e) if e.is_transient() && attempt <= retries => {
                    // No backoff in the mock; tests only count attempts.
                    continue;
                }
                Err(e) if e.is_transient() => {
                    return Err(DbError::retries_exhausted(attempt, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn select(&self, _sql: &str) -> DbResult<Vec<Row>> {
        self.try_attempt()?;
        self.select_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.select_rows.lock().unwrap().clone())
    }

    async fn disconnect(&self) {}

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_statements() {
        let db = MockDatabase::new();
        db.update("INSERT 1", 0).await.unwrap();
        db.update("INSERT 2", 0).await.unwrap();

        assert_eq!(db.executed(), vec!["INSERT 1", "INSERT 2"]);
        assert_eq!(db.update_count(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_retried() {
        let db = MockDatabase::new();
        db.fail_next(2);

        db.update("INSERT 1", 3).await.unwrap();

        // two failures + one success
        assert_eq!(db.attempt_count(), 3);
        assert_eq!(db.update_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let db = MockDatabase::new();
        db.fail_next(5);

        let err = db.update("INSERT 1", 2).await.unwrap_err();
        assert!(matches!(err, DbError::RetriesExhausted { .. }));
        assert_eq!(db.update_count(), 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let db = MockDatabase::new();
        db.set_fail_permanent(true);

        let err = db.update("INSERT 1", 5).await.unwrap_err();
        assert!(matches!(err, DbError::Execute { .. }));
        assert_eq!(db.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_select_serves_canned_rows() {
        let db = MockDatabase::new();
        db.set_select_rows(vec![Row::from([
            ("name".to_string(), "edge1".to_string()),
            ("hash_id".to_string(), "r1".to_string()),
            ("state".to_string(), "up".to_string()),
        ])]);

        let rows = db.select("SELECT ...").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["state"], "up");
        assert_eq!(db.select_count(), 1);
    }
}
