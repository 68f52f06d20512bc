// SPDX-License-Identifier: MIT

//! Tracing setup: JSON lines to a rolling file under the state directory,
//! plus a human-readable layer on stderr. Returns the
//! [`tracing_appender::non_blocking::WorkerGuard`] the caller must hold for
//! the process lifetime — dropping it stops the background flush thread.

use std::path::Path;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(state_dir: &Path, filter: &str) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(state_dir)?;
    let file_appender = tracing_appender::rolling::daily(state_dir, "poold.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
        .init();

    Ok(guard)
}
