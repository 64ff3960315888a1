// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote service selection.
//!
//! The gateway is the locator's back-end for services announced by other
//! nodes. The adhoc gateway keeps a plain multimap and picks uniformly at
//! random among the instances of a name.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use drover_core::PeerId;

use crate::locator::ServiceDescriptor;

/// One remote instance of a service.
#[derive(Debug, Clone)]
pub struct RemoteService {
    pub uuid: PeerId,
    pub descriptor: ServiceDescriptor,
}

/// Gateway seam consumed by the locator.
pub trait Gateway: Send + Sync {
    /// Pick an instance of `name`, or nothing if none are known.
    fn resolve(&self, name: &str) -> Option<RemoteService>;

    /// Record a service announced by a peer.
    fn consume(&self, uuid: &PeerId, descriptor: ServiceDescriptor);

    /// Drop one service of one peer.
    fn cleanup(&self, uuid: &PeerId, name: &str);

    /// Drop everything a peer announced (peer loss).
    fn cleanup_peer(&self, uuid: &PeerId);

    /// How many instances of `name` are known.
    fn count(&self, name: &str) -> usize;
}

/// Uniform-random selection over whatever is currently announced.
#[derive(Debug, Default)]
pub struct AdhocGateway {
    services: RwLock<HashMap<String, Vec<RemoteService>>>,
}

impl AdhocGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Gateway for AdhocGateway {
    fn resolve(&self, name: &str) -> Option<RemoteService> {
        let services = self.services.read();
        let instances = services.get(name)?;
        if instances.is_empty() {
            return None;
        }
        let picked = &instances[rand::thread_rng().gen_range(0..instances.len())];
        debug!(
            service = name,
            uuid = %picked.uuid,
            "providing a remote instance"
        );
        Some(picked.clone())
    }

    fn consume(&self, uuid: &PeerId, descriptor: ServiceDescriptor) {
        debug!(service = %descriptor.name, uuid = %uuid, "consumed remote service");
        let mut services = self.services.write();
        let instances = services.entry(descriptor.name.clone()).or_default();
        // Re-announcement replaces the peer's previous entry.
        instances.retain(|instance| instance.uuid != *uuid);
        instances.push(RemoteService {
            uuid: uuid.clone(),
            descriptor,
        });
    }

    fn cleanup(&self, uuid: &PeerId, name: &str) {
        debug!(service = name, uuid = %uuid, "removing remote service");
        let mut services = self.services.write();
        if let Some(instances) = services.get_mut(name) {
            instances.retain(|instance| instance.uuid != *uuid);
            if instances.is_empty() {
                services.remove(name);
            }
        }
    }

    fn cleanup_peer(&self, uuid: &PeerId) {
        debug!(uuid = %uuid, "removing every service of a peer");
        let mut services = self.services.write();
        services.retain(|_, instances| {
            instances.retain(|instance| instance.uuid != *uuid);
            !instances.is_empty()
        });
    }

    fn count(&self, name: &str) -> usize {
        self.services
            .read()
            .get(name)
            .map(|instances| instances.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
