// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Command dispatch.

mod run;
mod validate;
mod version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the selected command; `run` is the default.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.command.clone() {
        None | Some(Commands::Run) => run::run(&cli).await,
        Some(Commands::Validate) => validate::validate(&cli),
        Some(Commands::Version) => {
            version::version();
            Ok(())
        }
    }
}
