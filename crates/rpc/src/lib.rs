// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! drover-rpc: sessions, dispatches and slots.
//!
//! A [`Session`] multiplexes logical channels over one framed transport.
//! Each channel's receive side runs a [`Dispatch`]; handlers are plugged
//! in as slots via [`DispatchBuilder`]. The per-stream [`MessageQueue`]
//! buffers a stream's tx side until a sink shows up.

pub mod dispatch;
pub mod queue;
pub mod session;
pub mod slot;

pub use dispatch::{Dispatch, SessionControl, Transition};
pub use queue::{MessageQueue, QueuedMessage};
pub use session::{control, Session, Upstream};
pub use slot::{DeferredHandle, DispatchBuilder, SlotDispatch, StreamHandle};
