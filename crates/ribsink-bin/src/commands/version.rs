// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! Implementation of the `version` command.

/// Prints version information.
pub fn version() {
    println!("ribsink {}", env!("CARGO_PKG_VERSION"));
    println!("  core: {}", ribsink_core::VERSION);
}
