// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! # ribsink-db
//!
//! The database seam: a narrow [`Database`] trait over which writers and
//! the consumer engine ship SQL text, a PostgreSQL implementation
//! ([`PgHandle`]) with transient-failure retry and reconnect, and a
//! configurable [`MockDatabase`] for tests.
//!
//! Each writer owns its own handle - connections are never shared across
//! writers, which keeps per-key statement ordering trivially serial.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod handle;
pub mod mock;

pub use handle::{PgConnectConfig, PgHandle};
pub use mock::MockDatabase;

use std::collections::HashMap;

use async_trait::async_trait;

use ribsink_core::error::DbResult;

/// A row returned by [`Database::select`]: column name → textual value.
pub type Row = HashMap<String, String>;

/// The execution seam between the engine/writers and the database.
///
/// `update` is the single point where SQL strings are shipped. On a
/// transient failure (connection reset, deadlock, serialization
/// conflict) the implementation retries up to `retries` times with
/// backoff; a non-transient failure or exhausted retries surfaces as an
/// error and the caller drops the batch - the bus redelivers on restart
/// and the upsert schema absorbs the duplicates.
#[async_trait]
pub trait Database: Send + Sync {
    /// Executes a statement, retrying transient failures.
    ///
    /// Returns the number of affected rows.
    async fn update(&self, sql: &str, retries: u32) -> DbResult<u64>;

    /// Runs a query and returns rows as column → text maps.
    async fn select(&self, sql: &str) -> DbResult<Vec<Row>>;

    /// Closes the underlying connection.
    async fn disconnect(&self);

    /// Returns the implementation name for logging/metrics.
    fn name(&self) -> &str;
}
