// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Isolation layer: spawning worker processes.
//!
//! The overseer only sees the [`Spawner`] trait. The default
//! implementation launches plain child processes with the slave identity
//! and uplink socket carried in the environment; a fake records calls
//! for tests.

use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use drover_core::{AppName, SlaveId};

/// Errors from spawning workers.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to launch worker: {0}")]
    Launch(#[from] std::io::Error),
    #[error("spawner refused: {0}")]
    Refused(String),
}

/// Everything a worker process needs to find its way back.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    pub app: AppName,
    pub uuid: SlaveId,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Local socket path for the worker uplink.
    pub endpoint: PathBuf,
}

/// Invoked exactly once with the process exit code.
pub type ExitCallback = Box<dyn FnOnce(i32) + Send + 'static>;

/// Handle onto a spawned worker.
pub trait SpawnHandle: Send + Sync {
    /// Ask for the process to be killed. Idempotent.
    fn kill(&self);
}

/// Isolation plugin seam.
pub trait Spawner: Send + Sync {
    fn spawn(
        &self,
        config: SpawnConfig,
        on_exit: ExitCallback,
    ) -> Result<Box<dyn SpawnHandle>, SpawnError>;
}

/// Spawns plain child processes.
#[derive(Debug, Default)]
pub struct ProcessSpawner;

impl ProcessSpawner {
    pub fn new() -> Self {
        Self
    }
}

struct ProcessHandle {
    kill_tx: parking_lot::Mutex<Option<oneshot::Sender<()>>>,
}

impl SpawnHandle for ProcessHandle {
    fn kill(&self) {
        if let Some(tx) = self.kill_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(
        &self,
        config: SpawnConfig,
        on_exit: ExitCallback,
    ) -> Result<Box<dyn SpawnHandle>, SpawnError> {
        let mut command = tokio::process::Command::new(&config.executable);
        command
            .args(&config.args)
            .env("DROVER_APP", config.app.as_str())
            .env("DROVER_UUID", config.uuid.as_str())
            .env("DROVER_ENDPOINT", &config.endpoint)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command.spawn()?;
        debug!(app = %config.app, uuid = %config.uuid, "worker process launched");

        // Pump the worker's stdout into the log, line by line.
        if let Some(stdout) = child.stdout.take() {
            let app = config.app.clone();
            let uuid = config.uuid.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(app = %app, uuid = %uuid, "worker: {}", line);
                }
            });
        }

        let (kill_tx, mut kill_rx) = oneshot::channel();
        let uuid = config.uuid.clone();
        tokio::spawn(async move {
            let code = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => status.code().unwrap_or(-1),
                    Err(err) => {
                        warn!(uuid = %uuid, error = %err, "failed waiting for worker exit");
                        -1
                    }
                },
                _ = &mut kill_rx => {
                    let _ = child.start_kill();
                    match child.wait().await {
                        Ok(status) => status.code().unwrap_or(-1),
                        Err(_) => -1,
                    }
                }
            };
            debug!(uuid = %uuid, code, "worker process exited");
            on_exit(code);
        });

        Ok(Box::new(ProcessHandle {
            kill_tx: parking_lot::Mutex::new(Some(kill_tx)),
        }))
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Records spawn calls and lets tests drive exits by hand.
    #[derive(Default)]
    pub struct FakeSpawner {
        inner: Arc<FakeInner>,
    }

    #[derive(Default)]
    struct FakeInner {
        spawned: Mutex<Vec<SpawnConfig>>,
        exits: Mutex<HashMap<SlaveId, ExitCallback>>,
        kills: AtomicUsize,
        fail_next: AtomicBool,
    }

    pub struct FakeHandle {
        inner: Arc<FakeInner>,
    }

    impl SpawnHandle for FakeHandle {
        fn kill(&self) {
            self.inner.kills.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl FakeSpawner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next spawn call fail.
        pub fn fail_next(&self) {
            self.inner.fail_next.store(true, Ordering::SeqCst);
        }

        pub fn spawned(&self) -> Vec<SpawnConfig> {
            self.inner.spawned.lock().clone()
        }

        pub fn spawn_count(&self) -> usize {
            self.inner.spawned.lock().len()
        }

        pub fn kill_count(&self) -> usize {
            self.inner.kills.load(Ordering::SeqCst)
        }

        /// Simulate the child exiting with `code`.
        pub fn exit(&self, uuid: &SlaveId, code: i32) {
            if let Some(callback) = self.inner.exits.lock().remove(uuid) {
                callback(code);
            }
        }
    }

    impl Clone for FakeSpawner {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl Spawner for FakeSpawner {
        fn spawn(
            &self,
            config: SpawnConfig,
            on_exit: ExitCallback,
        ) -> Result<Box<dyn SpawnHandle>, SpawnError> {
            if self.inner.fail_next.swap(false, Ordering::SeqCst) {
                return Err(SpawnError::Refused("fail_next was set".into()));
            }
            self.inner.spawned.lock().push(config.clone());
            self.inner.exits.lock().insert(config.uuid, on_exit);
            Ok(Box::new(FakeHandle {
                inner: Arc::clone(&self.inner),
            }))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSpawner;
