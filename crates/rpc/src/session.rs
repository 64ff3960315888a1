// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session: one transport connection carrying multiplexed channels.
//!
//! A session owns a framed byte stream, a table of logical channels, and
//! the root dispatch new channels start from. A reader task walks inbound
//! frames through the per-channel dispatch; a writer task drains the
//! outbox. When the outbox grows past a soft limit the reader pauses on
//! all channels until the writer catches up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rmpv::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Notify};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use drover_core::{codes, graph::streaming, Fault};
use drover_wire::{Frame, FrameCodec, Header};

use crate::dispatch::{Dispatch, Transition};

/// Session-level control messages, carried on channel 0.
pub mod control {
    /// The control channel id.
    pub const CONTROL_CHANNEL: u64 = 0;

    pub const HANDSHAKE: u32 = 0;
    pub const HEARTBEAT: u32 = 1;
    pub const TERMINATE: u32 = 2;
    pub const GOAWAY: u32 = 3;
}

/// Outbox frames queued past this point pause session reads.
const WRITER_SOFT_LIMIT: usize = 1024;

fn queue_is_closed() -> Fault {
    Fault::new(codes::QUEUE_IS_CLOSED, "queue is closed")
}

/// Clonable handle onto the session's outgoing frame queue.
#[derive(Clone)]
pub(crate) struct SessionWriter {
    tx: mpsc::UnboundedSender<Frame>,
    queued: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    cancel: CancellationToken,
}

impl SessionWriter {
    fn send(&self, frame: Frame) -> Result<(), Fault> {
        if self.cancel.is_cancelled() {
            return Err(queue_is_closed());
        }
        self.queued.fetch_add(1, Ordering::SeqCst);
        self.tx.send(frame).map_err(|_| queue_is_closed())
    }

    /// Wait until the outbox is below the soft limit.
    async fn drained(&self) {
        while self.queued.load(Ordering::SeqCst) >= WRITER_SOFT_LIMIT {
            let notified = self.drained.notified();
            if self.queued.load(Ordering::SeqCst) < WRITER_SOFT_LIMIT {
                break;
            }
            notified.await;
        }
    }
}

struct ChannelSlot {
    rx: Option<Arc<dyn Dispatch>>,
    tx_open: bool,
}

struct SessionState {
    root: Arc<dyn Dispatch>,
    control: Option<Arc<dyn Dispatch>>,
    control_tx_open: bool,
    channels: HashMap<u64, ChannelSlot>,
    /// Highest remote-initiated channel id seen. Ids never repeat within
    /// a session, so anything at or below this that is not in the table
    /// is a closed channel.
    max_seen: u64,
    /// Our own initiator counter.
    next_local: u64,
}

pub(crate) struct Shared {
    name: String,
    writer: SessionWriter,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
}

impl Shared {
    fn tx_open(&self, channel: u64) -> bool {
        let state = self.state.lock();
        if channel == control::CONTROL_CHANNEL {
            state.control_tx_open
        } else {
            state
                .channels
                .get(&channel)
                .map(|slot| slot.tx_open)
                .unwrap_or(false)
        }
    }

    fn close_tx(&self, channel: u64) {
        let mut state = self.state.lock();
        if channel == control::CONTROL_CHANNEL {
            state.control_tx_open = false;
            return;
        }
        if let Some(slot) = state.channels.get_mut(&channel) {
            slot.tx_open = false;
            if slot.rx.is_none() {
                state.channels.remove(&channel);
                trace!(session = %self.name, channel, "stream removed");
            }
        }
    }

    fn close_rx(&self, channel: u64) {
        let mut state = self.state.lock();
        if channel == control::CONTROL_CHANNEL {
            state.control = None;
            return;
        }
        if let Some(slot) = state.channels.get_mut(&channel) {
            slot.rx = None;
            if !slot.tx_open {
                state.channels.remove(&channel);
                trace!(session = %self.name, channel, "stream removed");
            }
        }
    }
}

/// Tx side of one channel, handed to slots and to the overseer.
#[derive(Clone)]
pub struct Upstream {
    shared: Arc<Shared>,
    channel: u64,
}

impl Upstream {
    fn new(shared: Arc<Shared>, channel: u64) -> Self {
        Self { shared, channel }
    }

    pub fn channel(&self) -> u64 {
        self.channel
    }

    pub fn send(&self, message_id: u32, args: Vec<Value>) -> Result<(), Fault> {
        self.send_with_headers(message_id, args, Vec::new())
    }

    pub fn send_with_headers(
        &self,
        message_id: u32,
        args: Vec<Value>,
        headers: Vec<Header>,
    ) -> Result<(), Fault> {
        if !self.shared.tx_open(self.channel) {
            return Err(queue_is_closed());
        }
        self.shared
            .writer
            .send(Frame::new(self.channel, message_id, args).with_headers(headers))
    }

    /// Send a primitive `value` and close the tx side.
    pub fn value(&self, payload: Value) -> Result<(), Fault> {
        self.send(drover_core::graph::primitive::VALUE, vec![payload])?;
        self.close();
        Ok(())
    }

    /// Send a terminal `error` and close the tx side.
    pub fn error(&self, fault: &Fault) -> Result<(), Fault> {
        self.send(
            drover_core::graph::primitive::ERROR,
            vec![Value::from(fault.code), Value::from(fault.reason.as_str())],
        )?;
        self.close();
        Ok(())
    }

    /// Send a streaming `chunk`. The tx side stays open.
    pub fn chunk(&self, payload: Value) -> Result<(), Fault> {
        self.send(streaming::CHUNK, vec![payload])
    }

    /// Send a streaming `choke` terminator and close the tx side.
    pub fn choke(&self) -> Result<(), Fault> {
        self.send(streaming::CHOKE, vec![])?;
        self.close();
        Ok(())
    }

    /// Close the tx side. Idempotent.
    pub fn close(&self) {
        self.shared.close_tx(self.channel);
    }
}

/// One authenticated logical connection.
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Bind a session over a byte stream and start its reader and writer
    /// tasks. `root` is the dispatch new channels start from; `control`
    /// handles channel 0.
    pub fn bind<T>(
        name: impl Into<String>,
        io: T,
        root: Arc<dyn Dispatch>,
        control: Option<Arc<dyn Dispatch>>,
    ) -> Arc<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let name = name.into();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let drained = Arc::new(Notify::new());

        let shared = Arc::new(Shared {
            name: name.clone(),
            writer: SessionWriter {
                tx,
                queued: Arc::clone(&queued),
                drained: Arc::clone(&drained),
                cancel: cancel.clone(),
            },
            state: Mutex::new(SessionState {
                root,
                control,
                control_tx_open: true,
                channels: HashMap::new(),
                max_seen: 0,
                next_local: 0,
            }),
            cancel: cancel.clone(),
        });

        let session = Arc::new(Self {
            shared: Arc::clone(&shared),
        });

        let (read_half, write_half) = tokio::io::split(io);
        let reader = FramedRead::new(read_half, FrameCodec::new());
        let writer = FramedWrite::new(write_half, FrameCodec::new());

        tokio::spawn(run_reader(Arc::clone(&session), reader));
        tokio::spawn(run_writer(writer, rx, queued, drained, cancel));

        session
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Open a channel we initiate, with an optional rx dispatch for the
    /// peer's messages on it. Returns the tx side.
    pub fn open_channel(&self, rx: Option<Arc<dyn Dispatch>>) -> Upstream {
        let mut state = self.shared.state.lock();
        state.next_local += 1;
        let channel = state.next_local;
        state.channels.insert(
            channel,
            ChannelSlot {
                rx,
                tx_open: true,
            },
        );
        Upstream::new(Arc::clone(&self.shared), channel)
    }

    /// Send a session-level frame on the control channel.
    pub fn send_control(&self, message_id: u32, args: Vec<Value>) -> Result<(), Fault> {
        Upstream::new(Arc::clone(&self.shared), control::CONTROL_CHANNEL).send(message_id, args)
    }

    /// Announce a fatal session error and tear the session down.
    pub fn goaway(&self, fault: &Fault) {
        let _ = self.send_control(
            control::GOAWAY,
            vec![Value::from(fault.code), Value::from(fault.reason.as_str())],
        );
        self.close();
    }

    /// Tear the session down. Idempotent.
    pub fn close(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Resolves when the session is torn down, by either side.
    pub fn closed(&self) -> tokio_util::sync::WaitForCancellationFutureOwned {
        self.shared.cancel.clone().cancelled_owned()
    }

    /// Number of live channels, control excluded.
    pub fn channel_count(&self) -> usize {
        self.shared.state.lock().channels.len()
    }

    fn handle_frame(self: &Arc<Self>, frame: Frame) {
        if frame.channel == control::CONTROL_CHANNEL {
            self.handle_control(frame);
            return;
        }

        let dispatch = {
            let mut state = self.shared.state.lock();
            match state.channels.get(&frame.channel) {
                Some(slot) => match &slot.rx {
                    Some(dispatch) => Arc::clone(dispatch),
                    None => {
                        debug!(
                            session = %self.shared.name,
                            channel = frame.channel,
                            "frame on an rx-closed channel dropped"
                        );
                        return;
                    }
                },
                None => {
                    if frame.channel <= state.max_seen {
                        warn!(
                            session = %self.shared.name,
                            channel = frame.channel,
                            "frame on an unknown channel dropped"
                        );
                        return;
                    }
                    let root = Arc::clone(&state.root);
                    // A channel only opens on a message id the root
                    // dispatch knows. Graphless dispatches accept any.
                    let opens = root
                        .graph()
                        .map(|graph| graph.contains(frame.message_id))
                        .unwrap_or(true);
                    if !opens {
                        warn!(
                            session = %self.shared.name,
                            channel = frame.channel,
                            message_id = frame.message_id,
                            "channel-opening frame with an unknown message id dropped"
                        );
                        return;
                    }
                    state.max_seen = frame.channel;
                    state.channels.insert(
                        frame.channel,
                        ChannelSlot {
                            rx: Some(Arc::clone(&root)),
                            tx_open: true,
                        },
                    );
                    root
                }
            }
        };

        let upstream = Upstream::new(Arc::clone(&self.shared), frame.channel);
        self.advance(&frame, dispatch, upstream);
    }

    fn handle_control(self: &Arc<Self>, frame: Frame) {
        let dispatch = match self.shared.state.lock().control.clone() {
            Some(dispatch) => dispatch,
            None => {
                debug!(
                    session = %self.shared.name,
                    message_id = frame.message_id,
                    "control frame with no control dispatch dropped"
                );
                return;
            }
        };
        let upstream = Upstream::new(Arc::clone(&self.shared), control::CONTROL_CHANNEL);
        self.advance(&frame, dispatch, upstream);
    }

    fn advance(self: &Arc<Self>, frame: &Frame, dispatch: Arc<dyn Dispatch>, upstream: Upstream) {
        match dispatch.process(frame, &upstream) {
            Ok(Transition::Keep) => {}
            Ok(Transition::Replace(next)) => {
                let mut state = self.shared.state.lock();
                if frame.channel == control::CONTROL_CHANNEL {
                    state.control = Some(next);
                } else if let Some(slot) = state.channels.get_mut(&frame.channel) {
                    if slot.rx.is_some() {
                        slot.rx = Some(next);
                    }
                }
            }
            Ok(Transition::Terminate) => self.shared.close_rx(frame.channel),
            Err(fault) => {
                warn!(
                    session = %self.shared.name,
                    channel = frame.channel,
                    message_id = frame.message_id,
                    fault = %fault,
                    "slot processing failed"
                );
                let _ = upstream.error(&fault);
                self.shared.close_rx(frame.channel);
            }
        }
    }
}

async fn run_reader<R>(session: Arc<Session>, mut frames: FramedRead<R, FrameCodec>)
where
    R: AsyncRead + Unpin,
{
    loop {
        // Global backpressure: hold off reads while the outbox is deep.
        tokio::select! {
            _ = session.shared.cancel.cancelled() => break,
            _ = session.shared.writer.drained() => {}
        }

        tokio::select! {
            _ = session.shared.cancel.cancelled() => break,
            item = frames.next() => match item {
                Some(Ok(frame)) => session.handle_frame(frame),
                Some(Err(err)) => {
                    warn!(session = %session.shared.name, error = %err, "fatal protocol error");
                    session.goaway(&err.fault());
                    break;
                }
                None => {
                    debug!(session = %session.shared.name, "peer closed the connection");
                    session.close();
                    break;
                }
            },
        }
    }
}

async fn run_writer<W>(
    mut sink: FramedWrite<W, FrameCodec>,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    queued: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                // Flush whatever is already queued (goaway included).
                while let Ok(frame) = rx.try_recv() {
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
                break;
            }
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(err) = sink.send(frame).await {
            debug!(error = %err, "session writer failed");
            cancel.cancel();
            break;
        }
        let before = queued.fetch_sub(1, Ordering::SeqCst);
        if before == WRITER_SOFT_LIMIT {
            drained.notify_waiters();
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
