// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! PostgreSQL database handle.
//!
//! One [`PgHandle`] wraps one `tokio_postgres` connection. The handle
//! reconnects lazily: a statement that finds the connection closed (or
//! never opened) establishes a fresh one before executing. Transient
//! failures are retried with exponential backoff; everything else is
//! returned to the caller immediately.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, warn};

use ribsink_core::error::{DbError, DbResult};
use ribsink_core::retry::RetryConfig;

use crate::{Database, Row};

// =============================================================================
// Connection Configuration
// =============================================================================

/// Connection parameters for a PostgreSQL handle.
#[derive(Clone)]
pub struct PgConnectConfig {
    /// Server host (optionally `host:port`).
    pub host: String,
    /// Database name.
    pub db_name: String,
    /// Login role.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Whether to request SSL. TLS is negotiated by the connection
    /// string; deployments terminate TLS at a local proxy otherwise.
    pub ssl_enable: bool,
    /// Requested `sslmode` when SSL is enabled.
    pub ssl_mode: String,
    /// Statement timeout applied to every connection.
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for PgConnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnectConfig")
            .field("host", &self.host)
            .field("db_name", &self.db_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl_enable", &self.ssl_enable)
            .field("ssl_mode", &self.ssl_mode)
            .finish_non_exhaustive()
    }
}

impl PgConnectConfig {
    /// Renders the tokio-postgres connection string.
    pub fn to_conn_string(&self) -> String {
        let (host, port) = match self.host.split_once(':') {
            Some((h, p)) => (h, p),
            None => (self.host.as_str(), "5432"),
        };

        let mut conn = format!(
            "host={} port={} dbname={} user={} password={} connect_timeout={}",
            host,
            port,
            self.db_name,
            self.username,
            self.password,
            self.connect_timeout.as_secs().max(1),
        );

        if self.ssl_enable {
            conn.push_str(" sslmode=");
            conn.push_str(&self.ssl_mode);
        }

        conn
    }
}

// =============================================================================
// PgHandle
// =============================================================================

/// A reconnecting PostgreSQL handle. One per writer.
pub struct PgHandle {
    config: PgConnectConfig,
    retry: RetryConfig,
    client: Mutex<Option<Client>>,
}

impl PgHandle {
    /// Creates a handle; no connection is opened until first use.
    pub fn new(config: PgConnectConfig, retry: RetryConfig) -> Self {
        Self {
            config,
            retry,
            client: Mutex::new(None),
        }
    }

    /// Opens the connection eagerly.
    ///
    /// Used at startup so a misconfigured database fails fast instead of
    /// on the first batch.
    pub async fn connect(&self) -> DbResult<()> {
        let mut guard = self.client.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        Ok(())
    }

    async fn open(&self) -> DbResult<Client> {
        let conn_string = self.config.to_conn_string();

        let (client, connection) = tokio_postgres::connect(&conn_string, NoTls)
            .await
            .map_err(|e| DbError::connect_failed_with(e.to_string(), e))?;

        // The connection object drives the socket; it lives on its own
        // task and ends when the client is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection terminated");
            }
        });

        debug!(host = %self.config.host, db = %self.config.db_name, "connected to postgres");
        Ok(client)
    }

    /// Executes one attempt, reconnecting first if needed.
    async fn execute_once(&self, sql: &str) -> DbResult<u64> {
        let mut guard = self.client.lock().await;

        if guard.as_ref().map(|c| c.is_closed()).unwrap_or(true) {
            *guard = Some(self.open().await?);
        }

        let client = guard.as_ref().ok_or(DbError::Closed)?;

        match client.execute(sql, &[]).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                let err = classify(&e);
                if matches!(err, DbError::Closed) {
                    *guard = None;
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Database for PgHandle {
    async fn update(&self, sql: &str, retries: u32) -> DbResult<u64> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.execute_once(sql).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_transient() && attempt <= retries => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient database error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if attempt > retries && e.is_transient() => {
                    error!(attempts = attempt, error = %e, "database retries exhausted");
                    return Err(DbError::retries_exhausted(attempt, e.to_string()));
                }
                Err(e) => {
                    error!(error = %e, "database statement failed");
                    return Err(e);
                }
            }
        }
    }

    async fn select(&self, sql: &str) -> DbResult<Vec<Row>> {
        let mut guard = self.client.lock().await;

        if guard.as_ref().map(|c| c.is_closed()).unwrap_or(true) {
            *guard = Some(self.open().await?);
        }

        let client = guard.as_ref().ok_or(DbError::Closed)?;

        let rows = client.query(sql, &[]).await.map_err(|e| classify(&e))?;

        Ok(rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, col)| {
                        let value: Option<String> = row.try_get(i).unwrap_or(None);
                        (col.name().to_string(), value.unwrap_or_default())
                    })
                    .collect()
            })
            .collect())
    }

    async fn disconnect(&self) {
        let mut guard = self.client.lock().await;
        *guard = None;
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

impl std::fmt::Debug for PgHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgHandle")
            .field("host", &self.config.host)
            .field("db_name", &self.config.db_name)
            .finish_non_exhaustive()
    }
}

/// Maps a tokio-postgres error onto the sink's error model.
fn classify(e: &tokio_postgres::Error) -> DbError {
    if e.is_closed() {
        return DbError::Closed;
    }

    let sqlstate = e.code().map(|c| c.code().to_string());
    DbError::execute(e.to_string(), sqlstate)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PgConnectConfig {
        PgConnectConfig {
            host: "db.example.net".into(),
            db_name: "bgpdata".into(),
            username: "ribsink".into(),
            password: "secret".into(),
            ssl_enable: false,
            ssl_mode: "require".into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_conn_string_default_port() {
        let conn = config().to_conn_string();
        assert!(conn.contains("host=db.example.net"));
        assert!(conn.contains("port=5432"));
        assert!(conn.contains("dbname=bgpdata"));
        assert!(!conn.contains("sslmode"));
    }

    #[test]
    fn test_conn_string_explicit_port_and_ssl() {
        let mut cfg = config();
        cfg.host = "db.example.net:6432".into();
        cfg.ssl_enable = true;

        let conn = cfg.to_conn_string();
        assert!(conn.contains("port=6432"));
        assert!(conn.contains("sslmode=require"));
    }

    #[tokio::test]
    async fn test_update_fails_without_server() {
        let mut cfg = config();
        cfg.host = "127.0.0.1:1".into(); // nothing listens here
        cfg.connect_timeout = Duration::from_secs(1);

        let retry = RetryConfig::new().with_initial_delay(Duration::from_millis(1));
        let handle = PgHandle::new(cfg, retry);

        let err = handle.update("SELECT 1", 1).await.unwrap_err();
        assert!(matches!(err, DbError::RetriesExhausted { .. }));
    }
}
