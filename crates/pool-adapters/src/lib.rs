// SPDX-License-Identifier: MIT

//! Tier-specific hosting strategies (§4.6): the on-demand (cold), shared-pool
//! (warm), and container (hot) backends, all implementing the same
//! [`Backend`] contract so `pool-engine`'s pool manager can treat them
//! uniformly.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod backend;
pub mod container;
pub mod on_demand;
pub mod shared_pool;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use backend::{
    Backend, BackendError, BackendResult, BackendStats, InstanceConfig, InstanceFactory,
};
pub use container::{ContainerBackend, ContainerConfig, ContainerRuntime, ContainerRuntimeError, ContainerSpec, PortAllocator};
pub use on_demand::{OnDemandBackend, OnDemandConfig};
pub use shared_pool::{SharedPoolBackend, SharedPoolConfig};

#[cfg(not(any(test, feature = "test-support")))]
pub use container::KubeContainerRuntime;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgent, FakeBackend, FakeInstanceFactory};
