// SPDX-License-Identifier: MIT

//! The instance key: the canonical identity `tenant:project:mode`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identity of an agent instance: lowercase, colon-delimited
/// `tenant:project:mode`. Uniqueness is required within a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn new(tenant: impl AsRef<str>, project: impl AsRef<str>, mode: impl AsRef<str>) -> Self {
        Self(format!(
            "{}:{}:{}",
            tenant.as_ref().to_lowercase(),
            project.as_ref().to_lowercase(),
            mode.as_ref().to_lowercase()
        ))
    }

    /// Parse a canonical `tenant:project:mode` string.
    pub fn parse(s: &str) -> Result<Self, InvalidInstanceKey> {
        let mut parts = s.splitn(3, ':');
        let (tenant, project, mode) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(p), Some(m)) if !t.is_empty() && !p.is_empty() && !m.is_empty() => {
                (t, p, m)
            }
            _ => return Err(InvalidInstanceKey(s.to_string())),
        };
        Ok(Self::new(tenant, project, mode))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn tenant(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    pub fn project(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    pub fn mode(&self) -> &str {
        self.0.split(':').nth(2).unwrap_or_default()
    }

    /// The `(tenant, project)` pair used as the resource-accountant ledger key.
    pub fn project_scope(&self) -> (String, String) {
        (self.tenant().to_string(), self.project().to_string())
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstanceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for InstanceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Malformed instance key (expected `tenant:project:mode`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInstanceKey(pub String);

impl fmt::Display for InvalidInstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid instance key (expected tenant:project:mode): {:?}", self.0)
    }
}

impl std::error::Error for InvalidInstanceKey {}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;
