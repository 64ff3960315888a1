// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App profile: pool sizing, timeouts and isolation settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dynamic::Dynamic;

/// Errors from profile validation.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("{0} must be strictly positive")]
    ZeroTimeout(&'static str),
    #[error("pool_limit must be at least 1")]
    ZeroPoolLimit,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Isolation plugin selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolateConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "IsolateConfig::default_args")]
    pub args: Dynamic,
}

impl IsolateConfig {
    fn default_args() -> Dynamic {
        Dynamic::Table(toml::map::Map::new())
    }
}

impl Default for IsolateConfig {
    fn default() -> Self {
        Self {
            kind: "process".to_string(),
            args: Self::default_args(),
        }
    }
}

/// Runtime policy for one app. Validated at load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// How long an active slave may stay silent before it is killed.
    #[serde(default = "defaults::heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    /// How long an active slave may sit at zero load before despawn.
    #[serde(default = "defaults::idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// How long a spawned process may take to handshake.
    #[serde(default = "defaults::startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// How long a terminating slave may take to acknowledge.
    #[serde(default = "defaults::termination_timeout_ms")]
    pub termination_timeout_ms: u64,
    /// Per-slave concurrent channel cap.
    #[serde(default = "defaults::concurrency")]
    pub concurrency: u32,
    /// How many death reports to keep per app.
    #[serde(default = "defaults::crashlog_limit")]
    pub crashlog_limit: usize,
    /// Maximum number of slaves in the pool.
    #[serde(default = "defaults::pool_limit")]
    pub pool_limit: usize,
    /// Maximum number of pending requests.
    #[serde(default = "defaults::queue_limit")]
    pub queue_limit: usize,
    /// Requests-per-slave ratio that triggers pool growth.
    #[serde(default = "defaults::grow_threshold")]
    pub grow_threshold: usize,
    #[serde(default)]
    pub isolate: IsolateConfig,
}

mod defaults {
    pub fn heartbeat_timeout_ms() -> u64 {
        30_000
    }
    pub fn idle_timeout_ms() -> u64 {
        600_000
    }
    pub fn startup_timeout_ms() -> u64 {
        10_000
    }
    pub fn termination_timeout_ms() -> u64 {
        5_000
    }
    pub fn concurrency() -> u32 {
        10
    }
    pub fn crashlog_limit() -> usize {
        50
    }
    pub fn pool_limit() -> usize {
        10
    }
    pub fn queue_limit() -> usize {
        100
    }
    pub fn grow_threshold() -> usize {
        1
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: defaults::heartbeat_timeout_ms(),
            idle_timeout_ms: defaults::idle_timeout_ms(),
            startup_timeout_ms: defaults::startup_timeout_ms(),
            termination_timeout_ms: defaults::termination_timeout_ms(),
            concurrency: defaults::concurrency(),
            crashlog_limit: defaults::crashlog_limit(),
            pool_limit: defaults::pool_limit(),
            queue_limit: defaults::queue_limit(),
            grow_threshold: defaults::grow_threshold(),
            isolate: IsolateConfig::default(),
        }
    }
}

impl Profile {
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.heartbeat_timeout_ms == 0 {
            return Err(ProfileError::ZeroTimeout("heartbeat_timeout"));
        }
        if self.idle_timeout_ms == 0 {
            return Err(ProfileError::ZeroTimeout("idle_timeout"));
        }
        if self.startup_timeout_ms == 0 {
            return Err(ProfileError::ZeroTimeout("startup_timeout"));
        }
        if self.termination_timeout_ms == 0 {
            return Err(ProfileError::ZeroTimeout("termination_timeout"));
        }
        if self.pool_limit == 0 {
            return Err(ProfileError::ZeroPoolLimit);
        }
        if self.concurrency == 0 {
            return Err(ProfileError::ZeroConcurrency);
        }
        Ok(())
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn termination_timeout(&self) -> Duration {
        Duration::from_millis(self.termination_timeout_ms)
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
