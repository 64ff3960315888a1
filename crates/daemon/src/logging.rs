// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logging setup for the daemon.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install the global subscriber: env-filtered, written to the daemon
/// log under the runtime directory. The returned guard must be held for
/// the life of the process so buffered lines are flushed.
pub fn setup(config: &Config) -> std::io::Result<WorkerGuard> {
    let appender = tracing_appender::rolling::never(
        &config.paths.runtime,
        "droverd.log",
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
