// SPDX-License-Identifier: MIT

//! `poold`'s library half: everything `main` needs to turn environment
//! variables into a running [`pool_engine::orchestrator::Orchestrator`] —
//! tracing setup, the default alert sink and metrics source, and the HTTP
//! agent factory for the shared-pool and on-demand backends. The protocol,
//! admission, and scheduling logic itself lives in `pool-core`/`pool-engine`;
//! this crate is deliberately thin (§1 puts the HTTP/RPC surface, CLI, and
//! configuration loading out of scope for the core).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod agent_factory;
pub mod alert_log;
pub mod env;
pub mod logging;
pub mod metrics_source;
