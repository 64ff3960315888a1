// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Acceptors binding service dispatches to sockets.
//!
//! A TCP actor serves one dispatch to every client connection; the
//! worker actor accepts uplinks on an app's local socket and runs the
//! handshake path.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use drover_core::{Clock, Endpoint};
use drover_node::Overseer;
use drover_rpc::{Dispatch, Session, SessionControl};

use crate::config::Config;

/// Errors from binding acceptors.
#[derive(Debug, Error)]
pub enum ActorError {
    #[error("no port available for service '{0}'")]
    NoPort(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Bind a TCP listener for a named service: its pinned port, or the
/// first free port of the shared range.
pub fn bind_service(config: &Config, name: &str) -> Result<std::net::TcpListener, ActorError> {
    let addr = config.network.endpoint;
    if let Some(port) = config.network.ports.pinned.get(name) {
        let listener = std::net::TcpListener::bind((addr, *port))?;
        listener.set_nonblocking(true)?;
        return Ok(listener);
    }
    if let Some((first, last)) = config.network.ports.shared {
        for port in first..=last {
            match std::net::TcpListener::bind((addr, port)) {
                Ok(listener) => {
                    listener.set_nonblocking(true)?;
                    return Ok(listener);
                }
                Err(_) => continue,
            }
        }
        return Err(ActorError::NoPort(name.to_string()));
    }
    // Nothing configured: let the kernel pick.
    let listener = std::net::TcpListener::bind((addr, 0))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// A bound service acceptor.
pub struct Actor {
    name: String,
    endpoint: Endpoint,
    cancel: CancellationToken,
}

impl Actor {
    /// Start serving `root` on `listener`. Every accepted connection
    /// gets its own session.
    pub fn spawn(
        name: impl Into<String>,
        listener: std::net::TcpListener,
        root: Arc<dyn Dispatch>,
        cancel: CancellationToken,
    ) -> Result<Self, ActorError> {
        let name = name.into();
        let endpoint = Endpoint::from(listener.local_addr()?);
        let listener = TcpListener::from_std(listener)?;
        info!(service = %name, endpoint = %endpoint, "service exposed");

        let accept_name = name.clone();
        let accept_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            debug!(service = %accept_name, peer = %peer, "client connected");
                            let name = format!("{}/{}", accept_name, peer);
                            let control: Arc<dyn Dispatch> =
                                Arc::new(SessionControl::new(&name));
                            Session::bind(name, stream, Arc::clone(&root), Some(control));
                        }
                        Err(err) => {
                            error!(service = %accept_name, error = %err, "accept failed");
                        }
                    },
                }
            }
            debug!(service = %accept_name, "acceptor stopped");
        });

        Ok(Self {
            name,
            endpoint,
            cancel,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Accept worker uplinks on an app's local socket. Each connection gets
/// a one-shot handshaker bound to the overseer.
pub fn spawn_worker_acceptor<C: Clock>(
    socket_path: &Path,
    overseer: Arc<Overseer<C>>,
    cancel: CancellationToken,
) -> Result<(), ActorError> {
    // A stale socket from a previous run would fail the bind.
    let _ = std::fs::remove_file(socket_path);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    let app = overseer.name().clone();
    info!(app = %app, socket = %socket_path.display(), "worker uplink bound");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        debug!(app = %app, "worker connected");
                        let handshaker = overseer.handshaker();
                        let root: Arc<dyn Dispatch> = handshaker.clone();
                        let control: Arc<dyn Dispatch> = handshaker.clone();
                        let session =
                            Session::bind(format!("{}/worker", app), stream, root, Some(control));
                        handshaker.attach(session);
                    }
                    Err(err) => {
                        error!(app = %app, error = %err, "worker accept failed");
                    }
                },
            }
        }
        debug!(app = %app, "worker acceptor stopped");
    });

    Ok(())
}

#[cfg(test)]
#[path = "actor_tests.rs"]
mod tests;
