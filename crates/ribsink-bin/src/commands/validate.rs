// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Implementation of the `validate` command.

use ribsink_config::load_config;

use crate::cli::Cli;
use crate::error::BinResult;

/// Loads and validates the configuration file.
pub fn validate(cli: &Cli) -> BinResult<()> {
    let config = load_config(&cli.config)?;

    println!("configuration ok: {}", cli.config.display());
    println!("  consumer engines: {}", config.base.consumer_threads);
    println!(
        "  topic patterns:   {}",
        config.kafka.subscribe_topic_patterns.len()
    );
    println!(
        "  postgres:         {}/{}",
        config.postgres.host, config.postgres.db_name
    );

    Ok(())
}
