// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: start the daemon (default when no subcommand is given)
//! - `validate`: validate the configuration file and exit
//! - `version`: show version information

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// ribsink - stream aggregation of parsed BMP/BGP telemetry into
/// PostgreSQL.
#[derive(Parser, Debug)]
#[command(
    name = "ribsink",
    version,
    about = "Kafka to PostgreSQL aggregation for parsed BMP/BGP telemetry",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "ribsink.yaml",
        env = "RIBSINK_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        default_value = "info",
        env = "RIBSINK_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log output format
    #[arg(long, default_value = "text", env = "RIBSINK_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Resolves the effective log level from the flags.
    pub fn effective_log_level(&self) -> &str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the daemon (default)
    Run,

    /// Validate the configuration file and exit
    Validate,

    /// Show version information
    Version,
}

// =============================================================================
// Log Format
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text.
    Text,
    /// JSON lines for log aggregation.
    Json,
    /// Minimal single-line output.
    Compact,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let cli = Cli::parse_from(["ribsink"]);
        assert_eq!(cli.config, PathBuf::from("ribsink.yaml"));
        assert_eq!(cli.effective_log_level(), "info");
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_quiet_overrides_level() {
        let cli = Cli::parse_from(["ribsink", "--quiet", "--log-level", "trace"]);
        assert_eq!(cli.effective_log_level(), "warn");
    }

    #[test]
    fn test_verbose() {
        let cli = Cli::parse_from(["ribsink", "--verbose"]);
        assert_eq!(cli.effective_log_level(), "debug");
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::parse_from(["ribsink", "validate", "--config", "/etc/ribsink.yaml"]);
        assert!(matches!(cli.command, Some(Commands::Validate)));
        assert_eq!(cli.config, PathBuf::from("/etc/ribsink.yaml"));

        let cli = Cli::parse_from(["ribsink", "run"]);
        assert!(matches!(cli.command, Some(Commands::Run)));
    }
}
