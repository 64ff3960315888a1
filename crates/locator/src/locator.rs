// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The locator: the node's service directory.
//!
//! Keeps the local service table, mirrors of peer announcements, and the
//! routing groups. Readers take snapshots; writers hold a short exclusive
//! lock. `connect` subscribers get the current directory replayed, then
//! one event per change.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use rmpv::Value;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use drover_core::{codes, Endpoint, Fault, PeerId, ProtocolGraph};
use drover_rpc::{DispatchBuilder, SlotDispatch, StreamHandle, Transition};

use crate::gateway::Gateway;
use crate::routing::{Continuum, RoutingGroup};

/// Locator protocol message ids.
pub mod proto {
    pub const RESOLVE: u32 = 0;
    pub const CONNECT: u32 = 1;
    pub const REFRESH: u32 = 2;
    pub const ROUTING: u32 = 3;
    pub const CLUSTER: u32 = 4;
}

/// What `resolve` answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub version: u64,
    pub endpoints: Vec<Endpoint>,
    pub graph: ProtocolGraph,
}

/// Everything known about one peer node.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub uuid: PeerId,
    pub endpoints: Vec<Endpoint>,
    pub announced: HashMap<String, ServiceDescriptor>,
    pub last_seen: Instant,
}

/// Where `resolve` looks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPolicy {
    /// Local services win; the gateway is the fallback.
    LocalFirst,
    /// The gateway answers everything it can.
    Full,
}

/// Supplies routing group definitions on `refresh`. The backing store is
/// a collaborator; the locator only consumes this seam.
pub trait GroupSource: Send + Sync {
    fn load(&self, group: &str) -> Option<BTreeMap<String, u32>>;
}

/// Group definitions fixed at startup, typically from the config.
#[derive(Debug, Default)]
pub struct StaticGroups {
    groups: HashMap<String, BTreeMap<String, u32>>,
}

impl StaticGroups {
    pub fn new(groups: HashMap<String, BTreeMap<String, u32>>) -> Self {
        Self { groups }
    }
}

impl GroupSource for StaticGroups {
    fn load(&self, group: &str) -> Option<BTreeMap<String, u32>> {
        self.groups.get(group).cloned()
    }
}

struct CompiledGroup {
    group: RoutingGroup,
    continuum: Continuum,
}

/// The cluster-wide service directory of one node.
pub struct Locator {
    uuid: PeerId,
    policy: GatewayPolicy,
    gateway: Box<dyn Gateway>,
    groups: Box<dyn GroupSource>,
    local: RwLock<HashMap<String, ServiceDescriptor>>,
    peers: RwLock<HashMap<PeerId, PeerRecord>>,
    routing: RwLock<HashMap<String, CompiledGroup>>,
    subscribers: Mutex<Vec<StreamHandle>>,
}

impl Locator {
    pub fn new(
        uuid: PeerId,
        policy: GatewayPolicy,
        gateway: Box<dyn Gateway>,
        groups: Box<dyn GroupSource>,
    ) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            policy,
            gateway,
            groups,
            local: RwLock::new(HashMap::new()),
            peers: RwLock::new(HashMap::new()),
            routing: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn uuid(&self) -> &PeerId {
        &self.uuid
    }

    // --- Local service table ---

    /// Announce a locally-bound service.
    pub fn expose(&self, descriptor: ServiceDescriptor) {
        info!(service = %descriptor.name, "exposing service");
        self.local
            .write()
            .insert(descriptor.name.clone(), descriptor.clone());
        self.broadcast("expose", &descriptor.name, Some(&descriptor));
    }

    /// Withdraw a local service.
    pub fn withdraw(&self, name: &str) {
        info!(service = name, "withdrawing service");
        self.local.write().remove(name);
        self.broadcast("remove", name, None);
    }

    /// Resolve a service name to a descriptor, local or remote.
    pub fn resolve(&self, name: &str) -> Result<ServiceDescriptor, Fault> {
        let answer = match self.policy {
            GatewayPolicy::Full => self
                .gateway
                .resolve(name)
                .map(|remote| remote.descriptor)
                .or_else(|| self.local.read().get(name).cloned()),
            GatewayPolicy::LocalFirst => self
                .local
                .read()
                .get(name)
                .cloned()
                .or_else(|| self.gateway.resolve(name).map(|remote| remote.descriptor)),
        };
        answer.ok_or_else(|| Fault::service_not_available(name))
    }

    // --- Peer directory ---

    /// Ingest a peer announcement: its endpoints and service set.
    pub fn consume(
        &self,
        uuid: PeerId,
        endpoints: Vec<Endpoint>,
        services: Vec<ServiceDescriptor>,
        now: Instant,
    ) {
        debug!(uuid = %uuid, services = services.len(), "peer announcement");
        let mut peers = self.peers.write();
        let record = peers.entry(uuid.clone()).or_insert_with(|| PeerRecord {
            uuid: uuid.clone(),
            endpoints: endpoints.clone(),
            announced: HashMap::new(),
            last_seen: now,
        });
        record.endpoints = endpoints;
        record.last_seen = now;

        // Services the peer no longer announces are cleaned up.
        let incoming: HashMap<String, ServiceDescriptor> = services
            .into_iter()
            .map(|descriptor| (descriptor.name.clone(), descriptor))
            .collect();
        for name in record.announced.keys() {
            if !incoming.contains_key(name) {
                self.gateway.cleanup(&uuid, name);
            }
        }
        for descriptor in incoming.values() {
            self.gateway.consume(&uuid, descriptor.clone());
        }
        record.announced = incoming;
    }

    /// Forget a peer entirely.
    pub fn cleanup(&self, uuid: &PeerId) {
        debug!(uuid = %uuid, "peer lost");
        self.peers.write().remove(uuid);
        self.gateway.cleanup_peer(uuid);
    }

    /// The `uuid → endpoints` map of known peers.
    pub fn cluster(&self) -> HashMap<PeerId, Vec<Endpoint>> {
        self.peers
            .read()
            .values()
            .map(|record| (record.uuid.clone(), record.endpoints.clone()))
            .collect()
    }

    // --- Routing groups ---

    /// Reload a group definition from the source and recompile its
    /// continuum.
    pub fn refresh(&self, name: &str) -> Result<(), Fault> {
        let members = self.groups.load(name).ok_or_else(|| {
            Fault::new(
                codes::LOCATOR_NOT_FOUND,
                format!("routing group '{}' is not defined", name),
            )
        })?;
        let group = RoutingGroup::new(name, members);
        let continuum = group.compile();
        info!(group = name, points = continuum.len(), "routing group refreshed");
        self.routing
            .write()
            .insert(name.to_string(), CompiledGroup { group, continuum });
        Ok(())
    }

    /// Route a key within a group through its continuum snapshot.
    pub fn route(&self, group: &str, key: Option<&str>) -> Result<String, Fault> {
        let routing = self.routing.read();
        let compiled = routing.get(group).ok_or_else(|| {
            Fault::new(
                codes::LOCATOR_NOT_FOUND,
                format!("routing group '{}' is not loaded", group),
            )
        })?;
        let routed = match key {
            Some(key) => compiled.continuum.get(key),
            None => compiled.continuum.get_random(),
        };
        routed.map(str::to_string).ok_or_else(|| {
            Fault::new(
                codes::LOCATOR_NOT_FOUND,
                format!("routing group '{}' is empty", group),
            )
        })
    }

    /// Snapshot of the loaded groups and their member weights.
    pub fn routing_table(&self) -> BTreeMap<String, BTreeMap<String, u32>> {
        self.routing
            .read()
            .iter()
            .map(|(name, compiled)| (name.clone(), compiled.group.members.clone()))
            .collect()
    }

    // --- Directory stream ---

    /// Subscribe a stream to directory changes, seeded with the current
    /// state.
    pub fn connect(&self, stream: StreamHandle) {
        let snapshot: Vec<ServiceDescriptor> = self.local.read().values().cloned().collect();
        for descriptor in &snapshot {
            if stream
                .write(service_event("expose", &descriptor.name, Some(descriptor)))
                .is_err()
            {
                return;
            }
        }
        self.subscribers.lock().push(stream);
    }

    fn broadcast(&self, action: &str, name: &str, descriptor: Option<&ServiceDescriptor>) {
        let event = service_event(action, name, descriptor);
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|stream| match stream.write(event.clone()) {
            Ok(()) => true,
            Err(fault) => {
                debug!(fault = %fault, "dropping a directory subscriber");
                false
            }
        });
    }
}

fn service_event(action: &str, name: &str, descriptor: Option<&ServiceDescriptor>) -> Value {
    let descriptor = descriptor
        .and_then(|descriptor| rmpv::ext::to_value(descriptor).ok())
        .unwrap_or(Value::Nil);
    Value::Array(vec![
        Value::from(name),
        Value::from(action),
        descriptor,
    ])
}

/// Build the locator's RPC dispatch.
pub fn locator_dispatch(locator: &Arc<Locator>) -> Arc<SlotDispatch> {
    let resolve_locator = Arc::clone(locator);
    let connect_locator = Arc::clone(locator);
    let refresh_locator = Arc::clone(locator);
    let routing_locator = Arc::clone(locator);
    let cluster_locator = Arc::clone(locator);

    DispatchBuilder::new("locator", 1)
        .blocking(proto::RESOLVE, "resolve", move |args| {
            let name = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Fault::new(codes::INVOCATION_ERROR, "resolve expects a service name")
                })?;
            let descriptor = resolve_locator.resolve(name)?;
            rmpv::ext::to_value(&descriptor)
                .map_err(|err| Fault::new(codes::INVOCATION_ERROR, err.to_string()))
        })
        .streamed(proto::CONNECT, "connect", move |_args, handle| {
            connect_locator.connect(handle);
            Ok(Transition::Terminate)
        })
        .blocking(proto::REFRESH, "refresh", move |args| {
            let group = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Fault::new(codes::INVOCATION_ERROR, "refresh expects a group name")
                })?;
            refresh_locator.refresh(group)?;
            Ok(Value::Nil)
        })
        .blocking(proto::ROUTING, "routing", move |args| {
            // With a group argument, answer one group; bare, all of them.
            let table = routing_locator.routing_table();
            let filtered: Vec<(Value, Value)> = table
                .into_iter()
                .filter(|(name, _)| match args.first().and_then(Value::as_str) {
                    Some(wanted) => name == wanted,
                    None => true,
                })
                .map(|(name, members)| {
                    let members: Vec<(Value, Value)> = members
                        .into_iter()
                        .map(|(member, weight)| (Value::from(member), Value::from(weight)))
                        .collect();
                    (Value::from(name), Value::Map(members))
                })
                .collect();
            Ok(Value::Map(filtered))
        })
        .blocking(proto::CLUSTER, "cluster", move |_args| {
            let cluster: Vec<(Value, Value)> = cluster_locator
                .cluster()
                .into_iter()
                .map(|(uuid, endpoints)| {
                    let endpoints: Vec<Value> = endpoints
                        .iter()
                        .map(|endpoint| {
                            Value::Array(vec![
                                Value::from(endpoint.addr.to_string()),
                                Value::from(endpoint.port),
                            ])
                        })
                        .collect();
                    (Value::from(uuid.as_str()), Value::Array(endpoints))
                })
                .collect();
            Ok(Value::Map(cluster))
        })
        .build()
}

#[cfg(test)]
#[path = "locator_tests.rs"]
mod tests;
