// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-visible fault model.
//!
//! Every error frame on the wire carries a `[code, reason]` pair. The code
//! space is partitioned by subsystem; the constants here are contractual
//! and shared by both ends of a connection.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Contractual error codes, grouped by subsystem.
pub mod codes {
    // Protocol layer.
    pub const PARSE_ERROR: u32 = 1;
    pub const FRAME_FORMAT_ERROR: u32 = 2;
    pub const UNKNOWN_CHANNEL: u32 = 3;
    pub const UNKNOWN_MESSAGE_ID: u32 = 4;
    pub const FRAME_TOO_LARGE: u32 = 5;

    // Dispatch layer.
    pub const SLOT_NOT_FOUND: u32 = 100;
    pub const UNCAUGHT_ERROR: u32 = 101;
    pub const INVOCATION_ERROR: u32 = 102;
    pub const QUEUE_IS_CLOSED: u32 = 103;

    // Overseer.
    pub const QUEUE_IS_FULL: u32 = 200;
    pub const POOL_IS_FULL: u32 = 201;
    pub const INVALID_APP_STATE: u32 = 202;

    // Slave lifecycle.
    pub const SPAWN_TIMEOUT: u32 = 300;
    pub const ACTIVATE_TIMEOUT: u32 = 301;
    pub const HEARTBEAT_TIMEOUT: u32 = 302;
    pub const TERMINATE_TIMEOUT: u32 = 303;
    pub const INVALID_STATE: u32 = 304;
    pub const CONTROL_IPC_ERROR: u32 = 305;
    pub const OVERSEER_SHUTDOWNING: u32 = 306;
    pub const COMMITTED_SUICIDE: u32 = 307;
    pub const SLAVE_IDLE: u32 = 308;

    // Gateway / locator.
    pub const SERVICE_NOT_AVAILABLE: u32 = 400;
    pub const LOCATOR_NOT_FOUND: u32 = 401;

    // Node-visible.
    pub const DEADLINE_ERROR: u32 = 500;
    pub const RESOURCE_ERROR: u32 = 501;
    pub const TIMEOUT_ERROR: u32 = 502;
}

/// A `[code, reason]` pair as carried by protocol `error` frames.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub struct Fault {
    pub code: u32,
    pub reason: String,
}

impl Fault {
    pub fn new(code: u32, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Fault reported to a client whose assigned slave died mid-flight.
    pub fn slave_gone() -> Self {
        Self::new(codes::RESOURCE_ERROR, "slave gone")
    }

    pub fn service_not_available(name: &str) -> Self {
        Self::new(
            codes::SERVICE_NOT_AVAILABLE,
            format!("service '{}' is not available", name),
        )
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.reason)
    }
}

#[cfg(test)]
#[path = "fault_tests.rs"]
mod tests;
