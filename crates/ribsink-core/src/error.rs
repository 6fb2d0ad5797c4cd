// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Unified error hierarchy for ribsink.
//!
//! The hierarchy distinguishes the failure domains the consumer loop has
//! to treat differently:
//!
//! ```text
//! SinkError (root)
//! ├── DbError      - database connect/execute failures
//! ├── BusError     - Kafka client failures
//! └── DecodeError  - malformed or unroutable bus records
//! ```
//!
//! Database errors carry an `is_transient()` classification that drives
//! the retry loop: transient failures (connection reset, deadlock,
//! serialization conflict) are retried with backoff, everything else is
//! logged and the batch dropped - the bus redelivers on restart and the
//! schema absorbs duplicates through upsert.

use thiserror::Error;

// =============================================================================
// SinkError - Root Error Type
// =============================================================================

/// The root error type for ribsink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Database error.
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// Message bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Record decode error.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl SinkError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Db(e) => e.is_transient(),
            SinkError::Bus(e) => e.is_transient(),
            SinkError::Decode(_) => false,
        }
    }

    /// Returns the error domain as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            SinkError::Db(_) => "db",
            SinkError::Bus(_) => "bus",
            SinkError::Decode(_) => "decode",
        }
    }
}

// =============================================================================
// DbError
// =============================================================================

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish a connection.
    #[error("Connection failed: {message}")]
    ConnectFailed {
        /// Error message.
        message: String,
        /// Underlying driver error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The connection was closed underneath us.
    #[error("Connection closed")]
    Closed,

    /// A statement failed to execute.
    #[error("Statement failed{}: {message}", sqlstate_suffix(.sqlstate))]
    Execute {
        /// Error message.
        message: String,
        /// SQLSTATE code reported by the server, when available.
        sqlstate: Option<String>,
    },

    /// A statement failed after exhausting all retries.
    #[error("Statement failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error message.
        message: String,
    },
}

fn sqlstate_suffix(sqlstate: &Option<String>) -> String {
    match sqlstate {
        Some(code) => format!(" (SQLSTATE {code})"),
        None => String::new(),
    }
}

impl DbError {
    /// Creates a connection failed error.
    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connection failed error with a source.
    pub fn connect_failed_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an execute error.
    pub fn execute(message: impl Into<String>, sqlstate: Option<String>) -> Self {
        Self::Execute {
            message: message.into(),
            sqlstate,
        }
    }

    /// Creates a retries-exhausted error.
    pub fn retries_exhausted(attempts: u32, message: impl Into<String>) -> Self {
        Self::RetriesExhausted {
            attempts,
            message: message.into(),
        }
    }

    /// Returns `true` if this error is transient.
    ///
    /// Transient SQLSTATEs: `40001` (serialization failure), `40P01`
    /// (deadlock detected), `57P01` (admin shutdown) and the `08` class
    /// (connection exceptions). A closed connection is always transient;
    /// the retry path reconnects before the next attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::ConnectFailed { .. } | DbError::Closed => true,
            DbError::Execute { sqlstate, .. } => match sqlstate {
                Some(code) => {
                    code == "40001" || code == "40P01" || code == "57P01" || code.starts_with("08")
                }
                None => false,
            },
            DbError::RetriesExhausted { .. } => false,
        }
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            DbError::ConnectFailed { .. } => "connect_failed",
            DbError::Closed => "closed",
            DbError::Execute { .. } => "execute",
            DbError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

// =============================================================================
// BusError
// =============================================================================

/// Message bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// Failed to create the client from configuration.
    #[error("Client creation failed: {message}")]
    Create {
        /// Error message.
        message: String,
    },

    /// Failed to subscribe to a topic pattern.
    #[error("Subscribe failed for '{pattern}': {message}")]
    Subscribe {
        /// The offending pattern.
        pattern: String,
        /// Error message.
        message: String,
    },

    /// A poll returned a client error.
    #[error("Poll failed: {message}")]
    Poll {
        /// Error message.
        message: String,
    },

    /// Offset commit failed.
    #[error("Commit failed: {message}")]
    Commit {
        /// Error message.
        message: String,
    },

    /// Pause/resume of partitions failed.
    #[error("Partition control failed: {message}")]
    PartitionControl {
        /// Error message.
        message: String,
    },

    /// Producing a record failed.
    #[error("Produce failed: {message}")]
    Produce {
        /// Error message.
        message: String,
    },
}

impl BusError {
    /// Creates a client creation error.
    pub fn create(message: impl Into<String>) -> Self {
        Self::Create { message: message.into() }
    }

    /// Creates a subscribe error.
    pub fn subscribe(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Creates a poll error.
    pub fn poll(message: impl Into<String>) -> Self {
        Self::Poll { message: message.into() }
    }

    /// Creates a commit error.
    pub fn commit(message: impl Into<String>) -> Self {
        Self::Commit { message: message.into() }
    }

    /// Creates a partition control error.
    pub fn partition_control(message: impl Into<String>) -> Self {
        Self::PartitionControl { message: message.into() }
    }

    /// Creates a produce error.
    pub fn produce(message: impl Into<String>) -> Self {
        Self::Produce { message: message.into() }
    }

    /// Returns `true` if this error is transient.
    ///
    /// Poll and produce errors are transient (the client recovers on its
    /// own); configuration and subscribe errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BusError::Poll { .. } | BusError::Commit { .. } | BusError::Produce { .. }
        )
    }
}

// =============================================================================
// DecodeError
// =============================================================================

/// Record decode errors. Always non-fatal: the consumer logs at debug
/// level, drops the record and continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload was not valid JSON or did not match the record schema.
    #[error("Malformed payload: {message}")]
    Malformed {
        /// Error message.
        message: String,
    },

    /// Neither the typed header nor the topic suffix named a known kind.
    #[error("No handler for topic '{topic}'")]
    UnknownTopic {
        /// The unhandled topic.
        topic: String,
    },

    /// The payload had no content block.
    #[error("Empty payload")]
    Empty,
}

impl DecodeError {
    /// Creates a malformed payload error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed { message: message.into() }
    }

    /// Creates an unknown topic error.
    pub fn unknown_topic(topic: impl Into<String>) -> Self {
        Self::UnknownTopic { topic: topic.into() }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// A Result type with SinkError.
pub type SinkResult<T> = Result<T, SinkError>;

/// A Result type with DbError.
pub type DbResult<T> = Result<T, DbError>;

/// A Result type with BusError.
pub type BusResult<T> = Result<T, BusError>;

/// A Result type with DecodeError.
pub type DecodeResult<T> = Result<T, DecodeError>;

// =============================================================================
// Tests
// =============================================================================
