// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! ribsink - stream aggregation of parsed BMP/BGP telemetry into
//! PostgreSQL.
//!
//! Main binary entry point.

use clap::Parser;

use ribsink_bin::cli::Cli;
use ribsink_bin::commands;
use ribsink_bin::error::report_error_and_exit;
use ribsink_bin::logging::init_logging;

/// Application entry point.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.effective_log_level(), cli.log_format);

    if let Err(error) = commands::execute(cli).await {
        report_error_and_exit(error);
    }
}
