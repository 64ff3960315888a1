// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drover Daemon (droverd)
//!
//! Cluster node process: spawns and supervises app workers, multiplexes
//! client requests onto them, and serves the locator directory.

use std::path::PathBuf;
use std::process::ExitCode;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use drover_daemon::{config::Config, lifecycle, logging};

const DEFAULT_CONFIG: &str = "/etc/drover/drover.toml";

fn usage() {
    println!("droverd {}", env!("CARGO_PKG_VERSION"));
    println!("Drover daemon - cluster node hosting apps and the locator");
    println!();
    println!("USAGE:");
    println!("    droverd [--config <path>]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <path>  Configuration document (default: {DEFAULT_CONFIG})");
    println!("    -h, --help           Print help information");
    println!("    -v, --version        Print version information");
}

fn parse_args() -> Result<PathBuf, ExitCode> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("droverd {}", env!("CARGO_PKG_VERSION"));
                return Err(ExitCode::SUCCESS);
            }
            "--help" | "-h" | "help" => {
                usage();
                return Err(ExitCode::SUCCESS);
            }
            "--config" | "-c" => match args.next() {
                Some(path) => config = PathBuf::from(path),
                None => {
                    eprintln!("error: --config needs a path");
                    return Err(ExitCode::FAILURE);
                }
            },
            other => {
                eprintln!("error: unexpected argument '{other}'");
                eprintln!("Usage: droverd [--config <path>]");
                return Err(ExitCode::FAILURE);
            }
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = match parse_args() {
        Ok(path) => path,
        Err(code) => return code,
    };

    // Configuration or initialization failures exit with 1.
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("droverd: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = std::fs::create_dir_all(&config.paths.runtime) {
        eprintln!("droverd: cannot create {}: {err}", config.paths.runtime.display());
        return ExitCode::FAILURE;
    }
    let _log_guard = match logging::setup(&config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("droverd: logging setup failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match lifecycle::startup(config) {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "startup failed");
            eprintln!("droverd: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(err) => {
            error!(error = %err, "cannot install SIGTERM handler");
            runtime.shutdown();
            return ExitCode::FAILURE;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sig) => sig,
        Err(err) => {
            error!(error = %err, "cannot install SIGINT handler");
            runtime.shutdown();
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }

    runtime.shutdown();
    ExitCode::SUCCESS
}
