// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Binary-level errors and exit codes.
//!
//! Exit codes: `0` clean shutdown, `1` unrecoverable bus or database
//! failure at startup (or invalid configuration).

use thiserror::Error;
use tracing::error;

use ribsink_config::ConfigError;
use ribsink_core::error::{BusError, DbError};

/// Errors surfaced by the binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A component failed to initialize.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// The bus client failed fatally.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// The database failed fatally at startup.
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

impl BinError {
    /// Creates an initialization error.
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// A Result type with BinError.
pub type BinResult<T> = Result<T, BinError>;

/// Logs the error and terminates the process with its exit code.
pub fn report_error_and_exit(error: BinError) -> ! {
    error!("{error}");
    std::process::exit(error.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::initialization("boom").exit_code(), 1);
        let err: BinError = BusError::create("bad props").into();
        assert_eq!(err.exit_code(), 1);
    }
}
