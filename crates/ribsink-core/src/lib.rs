// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! # ribsink-core
//!
//! Core abstractions and shared types for the ribsink BMP/BGP stream
//! aggregator.
//!
//! This crate provides the foundational types and utilities used across
//! all ribsink components:
//!
//! - **Types**: record model for every consumed topic (`RouterRec`,
//!   `PeerRec`, `UnicastPrefixRec`, ...), `RecordKind`, `WriterType`
//! - **Envelope**: bus message envelope and the JSON record codec
//! - **Error**: unified error hierarchy
//! - **Cache**: router state mirror and base-attribute dedup cache
//! - **Subscriptions**: concurrent resource subscription table + sweeper
//! - **Retry**: backoff configuration shared by the database layer
//!
//! ## Example
//!
//! ```rust,ignore
//! use ribsink_core::envelope::decode_envelope;
//! use ribsink_core::types::RecordKind;
//!
//! let decoded = decode_envelope("bgpdata.parsed.router", payload)?;
//! assert_eq!(decoded.kind, RecordKind::Router);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cache;
pub mod envelope;
pub mod error;
pub mod retry;
pub mod subscriptions;
pub mod types;

pub use envelope::{decode_envelope, DecodedMessage, RecordBatch};
pub use error::{BusError, DbError, DecodeError, SinkError, SinkResult};
pub use types::{EntityState, RecordKind, WriterType};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
