// SPDX-License-Identifier: MIT

//! Structured logging setup: a non-blocking file appender under
//! `<state_dir>/logs/supervisor.log` plus an `RUST_LOG`-controlled filter,
//! in the same shape the rest of the corpus sets up tracing.

use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init(state_dir: &Path) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = state_dir.join("logs");
    std::fs::create_dir_all(&logs_dir)?;

    let file_appender = tracing_appender::rolling::never(&logs_dir, "supervisor.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(true))
        .init();

    Ok(guard)
}
