// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! drover-core: shared types for the drover runtime node.
//!
//! Identity types, endpoints, app manifests and profiles, the wire fault
//! model, protocol graphs, and the clock abstraction used to keep timer
//! logic deterministic under test.

pub mod clock;
pub mod dynamic;
pub mod endpoint;
pub mod fault;
pub mod graph;
pub mod id;
pub mod manifest;
pub mod profile;

pub use clock::{Clock, SystemClock};
pub use dynamic::Dynamic;
pub use endpoint::Endpoint;
pub use fault::{codes, Fault};
pub use graph::{GraphNode, ProtocolBuilder, ProtocolGraph};
pub use id::{AppName, PeerId, ShortId, SlaveId};
pub use manifest::{Manifest, ManifestError};
pub use profile::{IsolateConfig, Profile, ProfileError};

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
