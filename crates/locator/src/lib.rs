// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! drover-locator: service discovery and routing.
//!
//! The [`Locator`] resolves service names to endpoints from the local
//! actor table and from peer announcements (via a [`Gateway`]), streams
//! directory changes to peers, and routes weighted groups through a
//! Ketama [`Continuum`].

pub mod gateway;
pub mod locator;
pub mod routing;

pub use gateway::{AdhocGateway, Gateway, RemoteService};
pub use locator::{
    locator_dispatch, proto, GatewayPolicy, GroupSource, Locator, PeerRecord, ServiceDescriptor,
    StaticGroups,
};
pub use routing::{Continuum, RoutingGroup};
