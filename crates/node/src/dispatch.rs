// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatches that bridge client and worker channels.
//!
//! A request assignment wires two channels together: the client channel's
//! rx side ([`ClientStreamDispatch`]) forwards into the worker channel,
//! and the worker channel's rx side ([`WorkerClientDispatch`]) forwards
//! back. A shared [`ChannelWatcher`] fires once both directions finish,
//! so the slave's load is decremented exactly once.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rmpv::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use drover_core::{codes, graph::streaming, Fault, SlaveId};
use drover_rpc::{control, Dispatch, MessageQueue, QueuedMessage, Session, Transition, Upstream};
use drover_wire::Frame;

use crate::overseer::OverseerEvent;

fn unknown_message(dispatch: &str, message_id: u32) -> Fault {
    Fault::new(
        codes::UNKNOWN_MESSAGE_ID,
        format!("dispatch '{}' does not accept message {}", dispatch, message_id),
    )
}

type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Refcounted double-close guard for one assignment.
///
/// `close(TX)` and `close(RX)` may each be called once, from different
/// tasks; the callback fires exactly once, when both sides are done.
pub struct ChannelWatcher {
    closed: AtomicU8,
    callback: Mutex<Option<CloseCallback>>,
}

impl ChannelWatcher {
    pub const TX: u8 = 0x1;
    pub const RX: u8 = 0x2;
    const BOTH: u8 = Self::TX | Self::RX;

    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: AtomicU8::new(0),
            callback: Mutex::new(None),
        })
    }

    /// Install the both-sides-closed callback. Fires immediately if both
    /// sides already closed.
    pub fn set_callback(&self, callback: CloseCallback) {
        *self.callback.lock() = Some(callback);
        if self.closed.load(Ordering::SeqCst) == Self::BOTH {
            self.fire();
        }
    }

    pub fn close(&self, side: u8) {
        let preceding = self.closed.fetch_or(side, Ordering::SeqCst);
        if preceding & side == side {
            // This side was already closed; nothing new.
            return;
        }
        if preceding | side == Self::BOTH {
            self.fire();
        }
    }

    fn fire(&self) {
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// Rx dispatch for the client's channel: buffers and forwards the
/// client's `chunk* (error|choke)` toward the worker.
pub struct ClientStreamDispatch {
    name: String,
    queue: MessageQueue,
    finished: AtomicBool,
    on_finish: Mutex<Option<CloseCallback>>,
}

impl ClientStreamDispatch {
    pub fn new(app: &str) -> Self {
        Self {
            name: format!("{}/stream", app),
            queue: MessageQueue::new(),
            finished: AtomicBool::new(false),
            on_finish: Mutex::new(None),
        }
    }

    /// Attach the worker-channel sink. Buffered client messages replay in
    /// order; `on_finish` fires when the client's terminator has been
    /// forwarded (possibly right away).
    pub fn attach(&self, upstream: Upstream, on_finish: CloseCallback) -> Result<(), Fault> {
        self.queue.attach(upstream)?;
        if self.finished.load(Ordering::SeqCst) {
            self.queue.close();
            on_finish();
        } else {
            *self.on_finish.lock() = Some(on_finish);
        }
        Ok(())
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        if self.queue.is_closed() {
            return;
        }
        // Only meaningful once attached; before that the terminator sits
        // buffered and attach() completes the close. The callback runs
        // outside the lock.
        let on_finish = self.on_finish.lock().take();
        if let Some(on_finish) = on_finish {
            self.queue.close();
            on_finish();
        }
    }
}

impl Dispatch for ClientStreamDispatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, frame: &Frame, _upstream: &Upstream) -> Result<Transition, Fault> {
        let message = QueuedMessage {
            message_id: frame.message_id,
            args: frame.args.clone(),
            headers: frame.headers.clone(),
        };
        match frame.message_id {
            streaming::CHUNK => {
                if let Err(fault) = self.queue.append(message) {
                    debug!(dispatch = %self.name, fault = %fault, "client chunk dropped");
                }
                Ok(Transition::Keep)
            }
            streaming::ERROR | streaming::CHOKE => {
                if let Err(fault) = self.queue.append(message) {
                    debug!(dispatch = %self.name, fault = %fault, "client terminator dropped");
                }
                self.finish();
                Ok(Transition::Terminate)
            }
            other => Err(unknown_message(&self.name, other)),
        }
    }
}

/// Rx dispatch for the worker's channel: forwards the worker's
/// `chunk* (error|choke)` back to the client.
pub struct WorkerClientDispatch {
    name: String,
    client: Upstream,
    watcher: Arc<ChannelWatcher>,
}

impl WorkerClientDispatch {
    pub fn new(app: &str, client: Upstream, watcher: Arc<ChannelWatcher>) -> Self {
        Self {
            name: format!("{}/worker", app),
            client,
            watcher,
        }
    }
}

impl Dispatch for WorkerClientDispatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, frame: &Frame, _upstream: &Upstream) -> Result<Transition, Fault> {
        match frame.message_id {
            streaming::CHUNK => {
                if let Err(fault) = self
                    .client
                    .send(streaming::CHUNK, frame.args.clone())
                {
                    debug!(dispatch = %self.name, fault = %fault, "worker chunk dropped");
                }
                Ok(Transition::Keep)
            }
            streaming::ERROR => {
                let _ = self.client.send(streaming::ERROR, frame.args.clone());
                self.client.close();
                self.watcher.close(ChannelWatcher::RX);
                Ok(Transition::Terminate)
            }
            streaming::CHOKE => {
                let _ = self.client.choke();
                self.watcher.close(ChannelWatcher::RX);
                Ok(Transition::Terminate)
            }
            other => Err(unknown_message(&self.name, other)),
        }
    }
}

/// One-shot dispatch for a worker socket that has not introduced itself
/// yet. Expects `handshake(uuid)` and hands the session to the overseer.
pub struct Handshaker {
    name: String,
    session: Mutex<Option<Arc<Session>>>,
    activate: Box<dyn Fn(SlaveId, Arc<Session>) -> Result<Arc<dyn Dispatch>, Fault> + Send + Sync>,
}

impl Handshaker {
    pub fn new<F>(app: &str, activate: F) -> Self
    where
        F: Fn(SlaveId, Arc<Session>) -> Result<Arc<dyn Dispatch>, Fault> + Send + Sync + 'static,
    {
        Self {
            name: format!("{}/handshaker", app),
            session: Mutex::new(None),
            activate: Box::new(activate),
        }
    }

    /// Bind the session this handshaker authenticates. Must be called
    /// before the first frame can arrive.
    pub fn attach(&self, session: Arc<Session>) {
        *self.session.lock() = Some(session);
    }
}

impl Dispatch for Handshaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, frame: &Frame, _upstream: &Upstream) -> Result<Transition, Fault> {
        if frame.message_id != control::HANDSHAKE {
            return Err(unknown_message(&self.name, frame.message_id));
        }
        let uuid = frame
            .args
            .first()
            .and_then(Value::as_str)
            .map(SlaveId::new)
            .ok_or_else(|| {
                Fault::new(codes::INVOCATION_ERROR, "handshake carries no uuid")
            })?;
        let session = self
            .session
            .lock()
            .clone()
            .ok_or_else(|| Fault::new(codes::INVALID_STATE, "handshaker has no session"))?;

        match (self.activate)(uuid.clone(), Arc::clone(&session)) {
            Ok(control_dispatch) => Ok(Transition::Replace(control_dispatch)),
            Err(fault) => {
                warn!(uuid = %uuid, fault = %fault, "rejecting worker");
                session.close();
                Ok(Transition::Terminate)
            }
        }
    }
}

/// Control dispatch installed on an activated worker's channel 0.
pub struct ControlDispatch {
    name: String,
    uuid: SlaveId,
    events: mpsc::UnboundedSender<OverseerEvent>,
}

impl ControlDispatch {
    pub fn new(app: &str, uuid: SlaveId, events: mpsc::UnboundedSender<OverseerEvent>) -> Self {
        Self {
            name: format!("{}/control", app),
            uuid,
            events,
        }
    }
}

impl Dispatch for ControlDispatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, frame: &Frame, upstream: &Upstream) -> Result<Transition, Fault> {
        match frame.message_id {
            control::HEARTBEAT => {
                let _ = self.events.send(OverseerEvent::HeartbeatReceived {
                    uuid: self.uuid.clone(),
                });
                // Echo so the worker's own liveness timer resets too.
                let _ = upstream.send(control::HEARTBEAT, vec![]);
                Ok(Transition::Keep)
            }
            control::TERMINATE => {
                let code = frame
                    .args
                    .first()
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(0);
                let reason = frame
                    .args
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or("terminated")
                    .to_string();
                let _ = self.events.send(OverseerEvent::TerminateReceived {
                    uuid: self.uuid.clone(),
                    code,
                    reason,
                });
                Ok(Transition::Keep)
            }
            other => Err(unknown_message(&self.name, other)),
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
