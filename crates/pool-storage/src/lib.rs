// SPDX-License-Identifier: MIT

//! Checkpoint persistence for the state-recovery service (§4.9). The pool
//! never blocks its hot path on a checkpoint write; only the background
//! checkpoint loop and pre-shutdown drain in `pool-engine` call this crate.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod checkpoint;
#[cfg(feature = "redis-backend")]
pub mod redis_store;

pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointResult, CheckpointStats, CheckpointStore,
    CheckpointStoreError, CheckpointType, InMemoryCheckpointStore, RecoveryResult,
};
#[cfg(feature = "redis-backend")]
pub use redis_store::RedisCheckpointStore;
