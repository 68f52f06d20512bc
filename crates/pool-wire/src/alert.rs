// SPDX-License-Identifier: MIT

//! Alert sink contract (§6). The pool calls `send_alert` on escalation;
//! [`RetryingAlertSink`] composes any sink with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

pool_core::simple_display! {
    AlertSeverity {
        Info => "info",
        Warning => "warning",
        Error => "error",
        Critical => "critical",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub source: String,
    pub timestamp_ms: u64,
    pub metadata: Value,
}

impl Alert {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: AlertSeverity,
        source: impl Into<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            source: source.into(),
            timestamp_ms,
            metadata: Value::Null,
        }
    }
}

#[derive(Debug, Error)]
#[error("alert delivery failed: {0}")]
pub struct AlertSendError(pub String);

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> Result<(), AlertSendError>;
}

/// Wraps any [`AlertSink`] with exponential-backoff retries (§6: "can be
/// composed with a retry wrapper").
pub struct RetryingAlertSink<S> {
    inner: S,
    max_retries: u32,
    base_delay: Duration,
}

impl<S: AlertSink> RetryingAlertSink<S> {
    pub fn new(inner: S, max_retries: u32, base_delay: Duration) -> Self {
        Self { inner, max_retries, base_delay }
    }
}

#[async_trait]
impl<S: AlertSink> AlertSink for RetryingAlertSink<S> {
    async fn send_alert(&self, alert: &Alert) -> Result<(), AlertSendError> {
        let mut attempt = 0;
        loop {
            match self.inner.send_alert(alert).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.base_delay * 2u32.pow(attempt - 1);
                    tracing::warn!(attempt, error = %err, "alert delivery failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
#[path = "alert_tests.rs"]
mod tests;
