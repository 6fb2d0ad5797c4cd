// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Implementation of the `run` command.

use tracing::info;

use ribsink_config::load_config;

use crate::cli::Cli;
use crate::error::BinResult;
use crate::runtime::SinkRuntime;

/// Loads configuration and runs the daemon until shutdown.
pub async fn run(cli: &Cli) -> BinResult<()> {
    info!("starting ribsink...");

    let config = load_config(&cli.config)?;
    let runtime = SinkRuntime::new(config);

    runtime.run().await
}
