// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon binary.
//!
//! The core crates never read the environment directly (§1 puts
//! "configuration loading" out of scope for the core) — this is the one
//! place the embedding process translates `POOLD_*` variables into the
//! values `main` hands to `PoolConfig` and the tracing setup.

use std::path::PathBuf;

/// Directory for the daemon's log files and any local checkpoint store.
/// `POOLD_STATE_DIR` > `XDG_STATE_HOME/agent-pool` > `~/.local/state/agent-pool`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("POOLD_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("agent-pool");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".local/state/agent-pool")
}

/// `RUST_LOG`-style filter directive, e.g. `pool_engine=debug,info`.
pub fn log_filter() -> String {
    std::env::var("POOLD_LOG").unwrap_or_else(|_| "info".into())
}

/// When set, a Redis URL backs the checkpoint store instead of the
/// in-memory one. Unset is the right default for a single-node deployment.
pub fn redis_url() -> Option<String> {
    std::env::var("POOLD_REDIS_URL").ok().filter(|s| !s.is_empty())
}

/// Comma-separated list of `host:port` addresses for warm/cold-tier agent
/// workers reachable over the HTTP/JSON fallback protocol.
pub fn agent_addresses() -> Vec<String> {
    std::env::var("POOLD_AGENT_ADDRESSES")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
