// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-stream outbox.
//!
//! Buffers outgoing messages until an upstream is attached, then replays
//! them in order and forwards everything after directly. Used by the
//! overseer to hold a client's stream while the worker channel is still
//! being set up.

use parking_lot::Mutex;
use rmpv::Value;

use drover_core::{codes, Fault};
use drover_wire::Header;

use crate::session::Upstream;

/// One buffered message.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message_id: u32,
    pub args: Vec<Value>,
    pub headers: Vec<Header>,
}

enum State {
    Buffering(Vec<QueuedMessage>),
    Attached(Upstream),
    Closed,
}

/// Outbox for one stream. All operations are thread-safe.
pub struct MessageQueue {
    state: Mutex<State>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Buffering(Vec::new())),
        }
    }

    /// Append a message, either buffering it or forwarding it directly.
    pub fn append(&self, message: QueuedMessage) -> Result<(), Fault> {
        let mut state = self.state.lock();
        match &mut *state {
            State::Buffering(pending) => {
                pending.push(message);
                Ok(())
            }
            State::Attached(upstream) => upstream.send_with_headers(
                message.message_id,
                message.args,
                message.headers,
            ),
            State::Closed => Err(Fault::new(codes::QUEUE_IS_CLOSED, "queue is closed")),
        }
    }

    /// Attach the sink, replaying anything buffered in order.
    pub fn attach(&self, upstream: Upstream) -> Result<(), Fault> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, State::Closed) {
            State::Buffering(pending) => {
                for message in pending {
                    upstream.send_with_headers(
                        message.message_id,
                        message.args,
                        message.headers,
                    )?;
                }
                *state = State::Attached(upstream);
                Ok(())
            }
            State::Attached(previous) => {
                *state = State::Attached(previous);
                Err(Fault::new(
                    codes::INVALID_STATE,
                    "queue is already attached",
                ))
            }
            State::Closed => Err(Fault::new(codes::QUEUE_IS_CLOSED, "queue is closed")),
        }
    }

    /// Close the queue. Later appends fail; the attached upstream, if
    /// any, has its tx side closed. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let State::Attached(upstream) = &*state {
            upstream.close();
        }
        *state = State::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), State::Closed)
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
