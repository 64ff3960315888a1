// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! drover-node: per-app worker pool orchestration.
//!
//! The [`Overseer`] owns the pool of worker processes for one app,
//! queues client requests and bridges their streams onto worker
//! channels. Balancing policy, the isolation layer and the clock are
//! injected.

pub mod balancer;
pub mod dispatch;
pub mod overseer;
pub mod scheduler;
pub mod service;
pub mod slave;
pub mod spawn;

pub use balancer::{Balance, BalancerCtx, LoadBalancer, NullBalancer, Verdict};
pub use dispatch::{ChannelWatcher, ClientStreamDispatch, ControlDispatch, Handshaker};
pub use overseer::{worker, Overseer, OverseerEvent, PendingRequest};
pub use scheduler::Scheduler;
pub use service::{app, app_dispatch};
pub use slave::{DeathRecord, SlaveRecord, SlaveState};
pub use spawn::{ProcessSpawner, SpawnConfig, SpawnError, SpawnHandle, Spawner};

#[cfg(any(test, feature = "test-support"))]
pub use spawn::FakeSpawner;
