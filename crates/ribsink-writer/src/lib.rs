// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 The ribsink Authors. All rights reserved.

//! # ribsink-writer
//!
//! The writer fleet: batching database writer tasks and the per-type
//! pool that routes intake items to them.
//!
//! - [`writer`]: one writer owns one database handle and a bounded
//!   queue; it collects query triples into time/size-bounded batches,
//!   merges triples that target the same bulk statement and ships them.
//! - [`pool`]: sticky per-key routing plus dynamic scale-up, scale-down
//!   and rebalance, sampled on a 10-second cadence.
//!
//! The pool is driven synchronously by the consumer engine thread; only
//! the writers themselves are tokio tasks. Long drains invoke a caller
//! supplied heartbeat callback so the engine can keep its bus session
//! alive while it waits.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod pool;
pub mod writer;

pub use pool::{DbFactory, PoolConfig, WriterPool, WriterSnapshot};
pub use writer::{WriterConfig, WriterHandle, WriterState};
