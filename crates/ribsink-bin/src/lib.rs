// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! # ribsink-bin
//!
//! The ribsink daemon binary: CLI parsing, logging initialization,
//! shutdown coordination and the supervisor runtime that wires the
//! consumer engines, writer fleets and database handles together.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;
