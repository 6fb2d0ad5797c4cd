// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! # ribsink-config
//!
//! Configuration schema and loading for ribsink.
//!
//! Configuration is YAML with three sections - `base` (engine and writer
//! tuning), `postgres` (database connection and batching) and `kafka`
//! (bus client properties and topic patterns). Database connection
//! values can be overridden through `POSTGRES_*` environment variables
//! for containerized deployments.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigLoader};
pub use schema::{BaseConfig, KafkaConfig, PostgresConfig, SinkConfig};
