// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch: the receive-side protocol state machine of a channel.

use std::sync::Arc;

use drover_core::{codes, Fault, ProtocolGraph};
use drover_wire::Frame;

use crate::session::Upstream;

/// What the channel's rx side does after a message is processed.
pub enum Transition {
    /// Stay on the current dispatch (recursive slot).
    Keep,
    /// Install another dispatch for subsequent messages.
    Replace(Arc<dyn Dispatch>),
    /// The rx side is terminal; close it.
    Terminate,
}

/// A protocol state machine installed on a channel.
///
/// `process` runs on the session's reader task, one frame at a time. A
/// returned fault is converted into an `error` frame on the upstream and
/// the channel's rx side is closed.
pub trait Dispatch: Send + Sync {
    fn name(&self) -> &str;

    /// Protocol graph for introspection, if this dispatch has one.
    fn graph(&self) -> Option<&ProtocolGraph> {
        None
    }

    fn process(&self, frame: &Frame, upstream: &Upstream) -> Result<Transition, Fault>;
}

/// Fault for a message id with no slot in the current dispatch.
pub fn slot_not_found(dispatch: &str, message_id: u32) -> Fault {
    Fault::new(
        codes::SLOT_NOT_FOUND,
        format!("dispatch '{}' has no slot {}", dispatch, message_id),
    )
}

/// Channel-0 handler for ordinary client sessions: answers heartbeats,
/// takes note of `goaway`. Worker sessions use their own control path.
pub struct SessionControl {
    name: String,
}

impl SessionControl {
    pub fn new(session: &str) -> Self {
        Self {
            name: format!("{}/control", session),
        }
    }
}

impl Dispatch for SessionControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, frame: &Frame, upstream: &Upstream) -> Result<Transition, Fault> {
        match frame.message_id {
            crate::session::control::HEARTBEAT => {
                let _ = upstream.send(crate::session::control::HEARTBEAT, vec![]);
                Ok(Transition::Keep)
            }
            crate::session::control::GOAWAY => {
                tracing::debug!(dispatch = %self.name, args = ?frame.args, "peer said goaway");
                Ok(Transition::Keep)
            }
            other => Err(Fault::new(
                codes::UNKNOWN_MESSAGE_ID,
                format!("control channel does not accept message {}", other),
            )),
        }
    }
}
