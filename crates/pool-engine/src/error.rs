// SPDX-License-Identifier: MIT

//! Engine-level error type, wrapping the lower crates' errors plus the
//! conditions that only make sense once instances, backends, and recovery
//! are wired together.

use pool_adapters::backend::BackendError;
use pool_core::error::PoolError;
use pool_core::key::InstanceKey;
use pool_storage::checkpoint::CheckpointStoreError;
use pool_wire::agent::AgentContractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Agent(#[from] AgentContractError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointStoreError),

    /// §4.5 step 1: `execute` is rejected unless the lifecycle is active.
    #[error("instance {0} is not active")]
    InstanceNotActive(InstanceKey),

    /// §4.10: "Only one active recovery per instance at a time; concurrent
    /// reports short-circuit."
    #[error("recovery already in progress for {0}")]
    RecoveryInProgress(InstanceKey),

    #[error("no tier classification available for {tenant}:{project}")]
    ClassificationUnavailable { tenant: String, project: String },
}

pub type EngineResult<T> = Result<T, EngineError>;
