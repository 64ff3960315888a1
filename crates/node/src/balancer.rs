// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Balancing policies.
//!
//! The overseer consults its balancer with the pool lock held, so every
//! decision is consistent with the pool it saw. The balancer only ever
//! decides; spawning and assignment are carried out by the overseer.

use std::collections::HashMap;

use drover_core::{Profile, SlaveId};
use tracing::trace;

use crate::slave::SlaveRecord;

/// Snapshot handed to balancer callbacks.
pub struct BalancerCtx<'a> {
    pub pool: &'a HashMap<SlaveId, SlaveRecord>,
    pub queue_len: usize,
    pub profile: &'a Profile,
}

/// What to do with an incoming request.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Open a channel on this slave now.
    Assign(SlaveId),
    /// Queue the request and spawn one slave.
    Spawn,
    /// Queue the request.
    Queue,
}

/// Injectable balancing policy.
pub trait Balance: Send + Sync {
    fn on_request(&self, ctx: &BalancerCtx<'_>, event: &str, tag: Option<&str>) -> Verdict;

    /// Called after a request was queued. Returns how many slaves to
    /// spawn on top of the current pool.
    fn on_queue(&self, ctx: &BalancerCtx<'_>) -> usize;

    fn on_slave_spawn(&self, _uuid: &SlaveId) {}
    fn on_slave_death(&self, _uuid: &SlaveId) {}
    fn on_channel_started(&self, _uuid: &SlaveId, _channel: u64) {}
    fn on_channel_finished(&self, _uuid: &SlaveId, _channel: u64) {}
}

/// The reference policy: least-loaded assignable slave, demand-driven
/// growth.
#[derive(Debug, Default)]
pub struct LoadBalancer;

impl LoadBalancer {
    pub fn new() -> Self {
        Self
    }

    fn least_loaded(ctx: &BalancerCtx<'_>) -> Option<SlaveId> {
        ctx.pool
            .values()
            .filter(|rec| rec.assignable(ctx.profile.concurrency))
            .min_by_key(|rec| rec.load)
            .map(|rec| rec.uuid.clone())
    }
}

impl Balance for LoadBalancer {
    fn on_request(&self, ctx: &BalancerCtx<'_>, _event: &str, _tag: Option<&str>) -> Verdict {
        if ctx.pool.is_empty() {
            return Verdict::Spawn;
        }
        match Self::least_loaded(ctx) {
            Some(uuid) => Verdict::Assign(uuid),
            None => Verdict::Queue,
        }
    }

    fn on_queue(&self, ctx: &BalancerCtx<'_>) -> usize {
        let pool = ctx.pool.len();
        if pool >= ctx.profile.pool_limit {
            return 0;
        }
        // One spare slave past current demand, bounded by the pool limit.
        let demand = ctx.queue_len.div_ceil(ctx.profile.grow_threshold.max(1)) + 1;
        let target = demand.clamp(1, ctx.profile.pool_limit);
        let grow = target.saturating_sub(pool);
        if grow > 0 {
            trace!(pool, queue = ctx.queue_len, target, "pool growth requested");
        }
        grow
    }
}

/// Accepts nothing, grows nothing. For tests.
#[derive(Debug, Default)]
pub struct NullBalancer;

impl Balance for NullBalancer {
    fn on_request(&self, _ctx: &BalancerCtx<'_>, _event: &str, _tag: Option<&str>) -> Verdict {
        Verdict::Queue
    }

    fn on_queue(&self, _ctx: &BalancerCtx<'_>) -> usize {
        0
    }
}

#[cfg(test)]
#[path = "balancer_tests.rs"]
mod tests;
