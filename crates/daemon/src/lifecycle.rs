// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.
//!
//! Startup order: runtime directories, pid lock, locator, node service,
//! service actors, configured apps. Shutdown unwinds in reverse.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use drover_core::PeerId;
use drover_locator::{locator_dispatch, AdhocGateway, GatewayPolicy, Locator, StaticGroups};

use crate::actor::{bind_service, Actor, ActorError};
use crate::config::Config;
use crate::node::{node_dispatch, NodeService};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another droverd already holds {0}")]
    LockFailed(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Actor(#[from] ActorError),
}

/// Exclusive pid-file lock. Held for the life of the daemon; the file is
/// removed on drop.
pub struct PidLock {
    // Held only for the lock it carries.
    _file: File,
    path: PathBuf,
}

impl PidLock {
    pub fn acquire(path: PathBuf) -> Result<Self, LifecycleError> {
        // No truncation before the lock is ours; a losing contender must
        // not clobber the holder's pid.
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| LifecycleError::LockFailed(path.clone()))?;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(Self { _file: file, path })
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A started daemon: every long-lived piece, ready to be torn down.
pub struct Runtime {
    pub config: Config,
    pub locator: Arc<Locator>,
    pub node: Arc<NodeService>,
    pub locator_actor: Actor,
    pub node_actor: Actor,
    pub cancel: CancellationToken,
    _pid: PidLock,
}

/// Bring the node up. Must run inside the tokio runtime.
pub fn startup(config: Config) -> Result<Runtime, LifecycleError> {
    std::fs::create_dir_all(&config.paths.runtime)?;
    std::fs::create_dir_all(config.apps_path())?;
    let pid = PidLock::acquire(config.pid_path())?;

    let uuid = PeerId::generate();
    info!(uuid = %uuid, "node identity assigned");

    let groups: HashMap<_, _> = config
        .routing
        .iter()
        .map(|(name, members)| (name.clone(), members.clone()))
        .collect();
    let locator = Locator::new(
        uuid,
        GatewayPolicy::LocalFirst,
        Box::new(AdhocGateway::new()),
        Box::new(StaticGroups::new(groups)),
    );
    for group in config.routing.keys() {
        if let Err(fault) = locator.refresh(group) {
            error!(group = %group, fault = %fault, "routing group rejected");
        }
    }

    let cancel = CancellationToken::new();
    let node = NodeService::new(config.clone(), Arc::clone(&locator), cancel.clone());

    let node_listener = bind_service(&config, "node")?;
    let node_actor = Actor::spawn(
        "node",
        node_listener,
        node_dispatch(&node),
        cancel.child_token(),
    )?;

    let locator_listener = bind_service(&config, "locator")?;
    let locator_actor = Actor::spawn(
        "locator",
        locator_listener,
        locator_dispatch(&locator),
        cancel.child_token(),
    )?;

    // Apps named in the document come up with the node.
    for name in config.apps.keys() {
        if let Err(fault) = node.start_app(name, None) {
            error!(app = %name, fault = %fault, "configured app failed to start");
        }
    }

    info!(
        node = %node_actor.endpoint(),
        locator = %locator_actor.endpoint(),
        "droverd is up"
    );

    Ok(Runtime {
        config,
        locator,
        node,
        locator_actor,
        node_actor,
        cancel,
        _pid: pid,
    })
}

impl Runtime {
    /// Graceful teardown: apps first, then acceptors.
    pub fn shutdown(&self) {
        info!("droverd shutting down");
        self.node.shutdown();
        self.node_actor.stop();
        self.locator_actor.stop();
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
