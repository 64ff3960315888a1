// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The node service: app lifecycle over RPC.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rmpv::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use drover_core::{codes, Fault, SystemClock};
use drover_locator::{Locator, ServiceDescriptor};
use drover_node::{app_dispatch, LoadBalancer, Overseer, ProcessSpawner};
use drover_rpc::{Dispatch, DispatchBuilder, SlotDispatch};

use crate::actor::{bind_service, spawn_worker_acceptor, Actor};
use crate::config::Config;

/// Node service message ids.
pub mod proto {
    pub const START_APP: u32 = 0;
    pub const PAUSE_APP: u32 = 1;
    pub const LIST: u32 = 2;
    pub const INFO: u32 = 3;
}

struct AppHandle {
    overseer: Arc<Overseer<SystemClock>>,
    actor: Actor,
    cancel: CancellationToken,
}

/// Manages running apps: one overseer, one client actor and one worker
/// acceptor each.
pub struct NodeService {
    config: Config,
    locator: Arc<Locator>,
    apps: Mutex<HashMap<String, AppHandle>>,
    cancel: CancellationToken,
}

impl NodeService {
    pub fn new(config: Config, locator: Arc<Locator>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            config,
            locator,
            apps: Mutex::new(HashMap::new()),
            cancel,
        })
    }

    /// Start a configured app, optionally under a named profile.
    pub fn start_app(&self, name: &str, profile_name: Option<&str>) -> Result<(), Fault> {
        let mut apps = self.apps.lock();
        if apps.contains_key(name) {
            return Err(Fault::new(
                codes::INVALID_APP_STATE,
                format!("app '{}' is already running", name),
            ));
        }
        let manifest = self.config.manifest_for(name).ok_or_else(|| {
            Fault::new(
                codes::INVALID_APP_STATE,
                format!("app '{}' is not configured", name),
            )
        })?;
        let profile = match profile_name {
            Some(profile_name) => self
                .config
                .profiles
                .get(profile_name)
                .cloned()
                .ok_or_else(|| {
                    Fault::new(
                        codes::INVALID_APP_STATE,
                        format!("profile '{}' is not configured", profile_name),
                    )
                })?,
            None => self.config.profile_for(name),
        };

        let overseer = Overseer::new(
            manifest.clone(),
            profile,
            Box::new(ProcessSpawner::new()),
            Box::new(LoadBalancer::new()),
            SystemClock,
        );
        let cancel = self.cancel.child_token();

        spawn_worker_acceptor(&manifest.endpoint, Arc::clone(&overseer), cancel.clone())
            .map_err(|err| Fault::new(codes::RESOURCE_ERROR, err.to_string()))?;

        let dispatch = app_dispatch(&overseer);
        let graph = Dispatch::graph(dispatch.as_ref()).cloned().ok_or_else(|| {
            Fault::new(codes::RESOURCE_ERROR, "app dispatch has no protocol graph")
        })?;
        let listener = bind_service(&self.config, name)
            .map_err(|err| Fault::new(codes::RESOURCE_ERROR, err.to_string()))?;
        let actor = Actor::spawn(name, listener, dispatch, cancel.clone())
            .map_err(|err| Fault::new(codes::RESOURCE_ERROR, err.to_string()))?;

        tokio::spawn(Arc::clone(&overseer).run());

        self.locator.expose(ServiceDescriptor {
            name: name.to_string(),
            version: 1,
            endpoints: vec![actor.endpoint()],
            graph,
        });

        info!(app = name, endpoint = %actor.endpoint(), "app started");
        apps.insert(
            name.to_string(),
            AppHandle {
                overseer,
                actor,
                cancel,
            },
        );
        Ok(())
    }

    /// Stop an app: despawn its slaves, drop its acceptors, withdraw it
    /// from the directory.
    pub fn pause_app(&self, name: &str) -> Result<(), Fault> {
        let handle = self.apps.lock().remove(name).ok_or_else(|| {
            Fault::new(
                codes::INVALID_APP_STATE,
                format!("app '{}' is not running", name),
            )
        })?;
        info!(app = name, "app pausing");
        self.locator.withdraw(name);
        handle.actor.stop();
        handle.cancel.cancel();
        handle.overseer.shutdown();
        if let Some(manifest) = self.config.manifest_for(name) {
            let _ = std::fs::remove_file(&manifest.endpoint);
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.apps.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn info(&self, name: &str) -> Result<Value, Fault> {
        let apps = self.apps.lock();
        let handle = apps.get(name).ok_or_else(|| {
            Fault::new(
                codes::INVALID_APP_STATE,
                format!("app '{}' is not running", name),
            )
        })?;
        Ok(handle.overseer.info())
    }

    /// Stop everything; used at daemon shutdown.
    pub fn shutdown(&self) {
        let names = self.list();
        for name in names {
            if let Err(fault) = self.pause_app(&name) {
                warn!(app = %name, fault = %fault, "pause on shutdown failed");
            }
        }
    }
}

/// Build the node service's RPC dispatch.
pub fn node_dispatch(service: &Arc<NodeService>) -> Arc<SlotDispatch> {
    let start_service = Arc::clone(service);
    let pause_service = Arc::clone(service);
    let list_service = Arc::clone(service);
    let info_service = Arc::clone(service);

    DispatchBuilder::new("node", 1)
        .blocking(proto::START_APP, "start_app", move |args| {
            let name = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Fault::new(codes::INVOCATION_ERROR, "start_app expects an app name")
                })?;
            let profile = args.get(1).and_then(Value::as_str);
            start_service.start_app(name, profile)?;
            Ok(Value::Nil)
        })
        .blocking(proto::PAUSE_APP, "pause_app", move |args| {
            let name = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Fault::new(codes::INVOCATION_ERROR, "pause_app expects an app name")
                })?;
            pause_service.pause_app(name)?;
            Ok(Value::Nil)
        })
        .blocking(proto::LIST, "list", move |_| {
            Ok(Value::Array(
                list_service.list().into_iter().map(Value::from).collect(),
            ))
        })
        .blocking(proto::INFO, "info", move |args| {
            let name = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| Fault::new(codes::INVOCATION_ERROR, "info expects an app name"))?;
            info_service.info(name)
        })
        .build()
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
