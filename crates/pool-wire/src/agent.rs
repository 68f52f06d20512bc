// SPDX-License-Identifier: MIT

//! The contract every wrapped agent implementation must satisfy (§6
//! "Agent contract"). The core treats the event schema as opaque —
//! `AgentEvent` is a thin wrapper around whatever JSON the agent emits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentContractError {
    #[error("agent stream error: {0}")]
    Stream(String),
    #[error("agent health probe failed: {0}")]
    Health(String),
    #[error("agent shutdown failed: {0}")]
    Shutdown(String),
}

/// One event out of the agent's stream. Payload is intentionally opaque
/// JSON — only the pool's wrapper code inspects `event_type` when it needs
/// to (e.g. detecting a lifecycle-ready signal during container startup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event_type: String,
    #[serde(flatten)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub status: String,
    pub details: Option<Value>,
}

/// Implemented by every backend-specific wrapper around a hosted agent
/// (in-process, shared-pool slot, or container-proxied).
#[async_trait]
pub trait AgentContract: Send + Sync {
    async fn stream(
        &self,
        conversation_id: &str,
        user_message: &str,
        context: Value,
    ) -> Result<Vec<AgentEvent>, AgentContractError>;

    async fn health(&self) -> Result<AgentHealth, AgentContractError>;

    async fn shutdown(&self, graceful: bool, timeout_seconds: u64) -> Result<(), AgentContractError>;
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
