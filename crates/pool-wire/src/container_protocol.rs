// SPDX-License-Identifier: MIT

//! Wire types for the container worker's HTTP/JSON contract (§6), used as
//! the gRPC fallback the container backend speaks when a dedicated gRPC
//! channel isn't available.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHealthResponse {
    pub status: String,
    pub lifecycle_state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerExecuteRequest {
    pub conversation_id: String,
    pub message: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// One line of the newline-delimited JSON event stream `/execute` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerExecuteEvent {
    pub event_type: String,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerShutdownRequest {
    pub graceful: bool,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerShutdownResponse {
    pub acknowledged: bool,
}

/// Parse a newline-delimited JSON event stream body into individual events,
/// skipping blank lines. Malformed lines are reported as an error rather
/// than silently dropped, since a truncated stream usually indicates the
/// container crashed mid-response.
pub fn parse_ndjson_events(body: &str) -> Result<Vec<ContainerExecuteEvent>, serde_json::Error> {
    body.lines().filter(|line| !line.trim().is_empty()).map(serde_json::from_str).collect()
}

#[cfg(test)]
#[path = "container_protocol_tests.rs"]
mod tests;
