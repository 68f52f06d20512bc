// SPDX-License-Identifier: MIT

//! Default [`AlertSink`]: logs the escalation through `tracing` at a level
//! matched to severity. The alerting sink's real delivery (Slack, email,
//! PagerDuty) is pluggable (§1) — `main` wires this one in until an
//! operator supplies something that actually pages someone.

use async_trait::async_trait;
use pool_wire::alert::{Alert, AlertSendError, AlertSeverity, AlertSink};

pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<(), AlertSendError> {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::Error => {
                tracing::error!(title = %alert.title, source = %alert.source, message = %alert.message, "alert");
            }
            AlertSeverity::Warning => {
                tracing::warn!(title = %alert.title, source = %alert.source, message = %alert.message, "alert");
            }
            AlertSeverity::Info => {
                tracing::info!(title = %alert.title, source = %alert.source, message = %alert.message, "alert");
            }
        }
        Ok(())
    }
}
