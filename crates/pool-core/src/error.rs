// SPDX-License-Identifier: MIT

//! Crate-level error kinds.
//!
//! These mirror the abstract error kinds in the pool's error handling design:
//! kinds raised below the pool manager are never retried locally — retry and
//! escalation policy lives in the failure-recovery service (`pool-engine`).

use thiserror::Error;

use crate::key::InstanceKey;

#[derive(Debug, Error)]
pub enum PoolError {
    /// Global or per-project resource limit would be breached. Not retried.
    #[error("quota exceeded ({scope}): {message}")]
    QuotaExceeded { scope: String, message: String },

    /// A backend's configured instance ceiling was reached and no idle
    /// instance could be evicted to make room.
    #[error("instance ceiling reached for tier {tier}")]
    MaxInstances { tier: &'static str },

    /// Attempted a transition the lifecycle table does not permit. This is a
    /// programming error, not a runtime condition — it is fatal and should be
    /// escalated rather than retried.
    #[error("{instance_key}: {trigger:?} is not a legal transition from {from:?}")]
    InvalidStateTransition { instance_key: InstanceKey, from: String, trigger: String },

    /// The circuit guarding a dependency is open; caller may retry after
    /// `retry_after_ms`.
    #[error("circuit '{name}' is open, retry after {retry_after_ms}ms")]
    CircuitOpen { name: String, retry_after_ms: u64 },

    /// Instance initialization failed. Recoverable via the failure-recovery
    /// service's retry policy.
    #[error("initialization failed for {instance_key}: {message}")]
    InitializationFailed { instance_key: InstanceKey, message: String },

    /// Backend-level creation timeout. Reported to failure-recovery as
    /// `InitializationFailed`.
    #[error("creation of {instance_key} timed out after {timeout_seconds}s")]
    CreationTimeout { instance_key: InstanceKey, timeout_seconds: u64 },

    /// Operation-level timeout.
    #[error("operation timed out for {instance_key}")]
    Timeout { instance_key: InstanceKey },

    /// Runtime container signal indicating exhaustion; triggers a migrate
    /// (tier downgrade) recovery action.
    #[error("resource exhausted for {instance_key}: {message}")]
    ResourceExhausted { instance_key: InstanceKey, message: String },

    /// Network failure to a container-hosted instance; triggers restart.
    #[error("connection lost to {instance_key}")]
    ConnectionLost { instance_key: InstanceKey },

    /// Observed by the container backend's health loop; triggers state
    /// recovery then restart.
    #[error("container crashed for {instance_key}: {message}")]
    ContainerCrashed { instance_key: InstanceKey, message: String },

    /// No instance registered under this key.
    #[error("no instance for key {0}")]
    NotFound(InstanceKey),

    /// Default classification; always escalates.
    #[error("unknown error for {instance_key}: {message}")]
    Unknown { instance_key: InstanceKey, message: String },
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
