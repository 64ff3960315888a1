// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slave records and the worker lifecycle state machine.
//!
//! A slave moves `spawning → handshaking → active → terminating` and ends
//! as a death record. There is no `dead` state in the pool: dying removes
//! the entry and appends to the app's crashlog.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use drover_core::{Fault, SlaveId};
use drover_rpc::{Session, Upstream};

use crate::spawn::SpawnHandle;

/// Lifecycle states of a pooled slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    /// Process requested from the isolation layer; no connection yet.
    Spawning,
    /// Handshake frame seen; control dispatch being installed.
    Handshaking,
    /// Fully connected and accepting assignments.
    Active,
    /// Winding down; no new assignments.
    Terminating,
}

impl SlaveState {
    pub fn name(&self) -> &'static str {
        match self {
            SlaveState::Spawning => "spawning",
            SlaveState::Handshaking => "handshaking",
            SlaveState::Active => "active",
            SlaveState::Terminating => "terminating",
        }
    }
}

/// One entry in the overseer pool.
pub struct SlaveRecord {
    pub uuid: SlaveId,
    pub state: SlaveState,
    pub load: u32,
    pub spawned_at: Instant,
    pub last_heartbeat_at: Option<Instant>,
    /// Set on successful handshake.
    pub session: Option<Arc<Session>>,
    /// Child process handle from the isolation layer.
    pub handle: Option<Box<dyn SpawnHandle>>,
    pub active_channels: HashSet<u64>,
    /// Client upstreams per open worker channel, notified if we die.
    pub assignments: HashMap<u64, Upstream>,
    /// Why this slave is terminating, when it is.
    pub termination_reason: Option<Fault>,
}

impl SlaveRecord {
    pub fn new(uuid: SlaveId, spawned_at: Instant, handle: Box<dyn SpawnHandle>) -> Self {
        Self {
            uuid,
            state: SlaveState::Spawning,
            load: 0,
            spawned_at,
            last_heartbeat_at: None,
            session: None,
            handle: Some(handle),
            active_channels: HashSet::new(),
            assignments: HashMap::new(),
            termination_reason: None,
        }
    }

    /// Whether the overseer may open another channel on this slave.
    pub fn assignable(&self, concurrency: u32) -> bool {
        self.state == SlaveState::Active && self.load < concurrency
    }
}

/// One crashlog entry.
#[derive(Debug, Clone)]
pub struct DeathRecord {
    pub uuid: SlaveId,
    pub at: Instant,
    pub fault: Fault,
}

/// Timer id helpers. One timer namespace per overseer; ids carry the
/// slave uuid so a whole slave can be swept by prefix.
pub mod timer {
    use drover_core::SlaveId;

    pub fn startup(uuid: &SlaveId) -> String {
        format!("startup:{}", uuid)
    }

    pub fn heartbeat(uuid: &SlaveId) -> String {
        format!("heartbeat:{}", uuid)
    }

    pub fn idle(uuid: &SlaveId) -> String {
        format!("idle:{}", uuid)
    }

    pub fn terminate(uuid: &SlaveId) -> String {
        format!("terminate:{}", uuid)
    }

    /// Split a fired timer id back into `(kind, uuid)`.
    pub fn parse(id: &str) -> Option<(&str, SlaveId)> {
        let (kind, uuid) = id.split_once(':')?;
        Some((kind, SlaveId::new(uuid)))
    }

    /// Every timer id belonging to one slave, for sweeping.
    pub fn all(uuid: &SlaveId) -> [String; 4] {
        [startup(uuid), heartbeat(uuid), idle(uuid), terminate(uuid)]
    }
}

#[cfg(test)]
#[path = "slave_tests.rs"]
mod tests;
