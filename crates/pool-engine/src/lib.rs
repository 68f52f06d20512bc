// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pool-engine: the async machinery built on top of `pool-core`'s pure
//! types — the agent instance wrapper, prewarm pool, health monitor,
//! failure-recovery service, auto-scaler, tier-classification hysteresis,
//! state-recovery checkpoint orchestration, and the pool manager that
//! wires them all together around a set of backends.

pub mod autoscaler;
pub mod classification;
pub mod error;
pub mod failure_recovery;
pub mod health_monitor;
pub mod instance;
pub mod orchestrator;
pub mod pool_manager;
pub mod prewarm;
pub mod state_recovery;

pub use autoscaler::{AutoScaler, ScalingDirection, ScalingEvent, ScalingMetricsSample};
pub use classification::TierClassifier;
pub use error::{EngineError, EngineResult};
pub use failure_recovery::{FailureEvent, FailureRecoveryConfig, FailureRecoveryService, FailureType, RecoveryExecutor};
pub use health_monitor::HealthMonitor;
pub use instance::AgentInstance;
pub use orchestrator::{Orchestrator, OrchestratorDeps, PoolStatus};
pub use pool_manager::{PoolManager, ProjectMetricsSource};
pub use prewarm::{PrewarmLevel, PrewarmPool, PrewarmStats};
pub use state_recovery::{InstanceSource, StateRecoveryService};
