// SPDX-License-Identifier: MIT

//! Wire-level contracts the pool speaks to the outside world: the agent
//! contract every backend wraps, the container worker's HTTP/JSON
//! protocol, the alert sink, and the Prometheus metrics exporter.
//!
//! Nothing in this crate holds pool state; it only defines the shapes
//! crossing a process boundary and (for [`alert::RetryingAlertSink`]) a
//! thin retry policy around them.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod agent;
pub mod alert;
pub mod container_protocol;
pub mod metrics_export;

pub use agent::{AgentContract, AgentContractError, AgentEvent, AgentHealth};
pub use alert::{Alert, AlertSendError, AlertSeverity, AlertSink, RetryingAlertSink};
pub use container_protocol::{
    parse_ndjson_events, ContainerExecuteEvent, ContainerExecuteRequest, ContainerHealthResponse,
    ContainerShutdownRequest, ContainerShutdownResponse,
};
pub use metrics_export::{InstanceSnapshot, MetricsExporter};
