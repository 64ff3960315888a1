// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slot kinds and the table-driven dispatch built from them.
//!
//! A slot is a handler for one message id. Blocking slots answer inline;
//! deferred slots answer exactly once, later; streamed slots push
//! `chunk* (error|choke)`; mute slots never answer. Failures, panics
//! included, are converted to `error` frames at the slot boundary.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rmpv::Value;
use tracing::{debug, error};

use drover_core::{
    codes,
    graph::{streaming, GraphRef},
    Fault, ProtocolBuilder, ProtocolGraph,
};
use drover_wire::Frame;

use crate::dispatch::{slot_not_found, Dispatch, Transition};
use crate::session::Upstream;

fn queue_is_closed() -> Fault {
    Fault::new(codes::QUEUE_IS_CLOSED, "queue is closed")
}

fn uncaught() -> Fault {
    Fault::new(codes::UNCAUGHT_ERROR, "slot handler panicked")
}

/// One-shot writable handed to deferred slots.
#[derive(Clone)]
pub struct DeferredHandle {
    upstream: Upstream,
    fired: Arc<AtomicBool>,
}

impl DeferredHandle {
    fn new(upstream: Upstream) -> Self {
        Self {
            upstream,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver the single value and close the stream.
    pub fn write(&self, payload: Value) -> Result<(), Fault> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return Err(queue_is_closed());
        }
        self.upstream.value(payload)
    }

    /// Deliver the single error and close the stream.
    pub fn abort(&self, fault: &Fault) -> Result<(), Fault> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return Err(queue_is_closed());
        }
        self.upstream.error(fault)
    }
}

/// Push side handed to streamed slots.
#[derive(Clone)]
pub struct StreamHandle {
    upstream: Upstream,
    closed: Arc<AtomicBool>,
}

impl StreamHandle {
    pub(crate) fn new(upstream: Upstream) -> Self {
        Self {
            upstream,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The raw tx side this handle pushes through.
    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Push one chunk.
    pub fn write(&self, payload: Value) -> Result<(), Fault> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(queue_is_closed());
        }
        self.upstream.chunk(payload)
    }

    /// Terminate the stream with an error.
    pub fn error(&self, fault: &Fault) -> Result<(), Fault> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(queue_is_closed());
        }
        self.upstream.send(
            streaming::ERROR,
            vec![Value::from(fault.code), Value::from(fault.reason.as_str())],
        )?;
        self.upstream.close();
        Ok(())
    }

    /// Terminate the stream normally. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.upstream.send(streaming::CHOKE, vec![]);
        self.upstream.close();
    }
}

type BlockingFn = dyn Fn(Vec<Value>) -> Result<Value, Fault> + Send + Sync;
type DeferredFn = dyn Fn(Vec<Value>, DeferredHandle) -> Result<(), Fault> + Send + Sync;
type StreamedFn = dyn Fn(Vec<Value>, StreamHandle) -> Result<Transition, Fault> + Send + Sync;
type MuteFn = dyn Fn(Vec<Value>) -> Result<(), Fault> + Send + Sync;

enum Slot {
    Blocking(Arc<BlockingFn>),
    Deferred(Arc<DeferredFn>),
    Streamed(Arc<StreamedFn>),
    Mute(Arc<MuteFn>),
}

/// Dispatch backed by a message-id → slot table.
pub struct SlotDispatch {
    name: String,
    graph: ProtocolGraph,
    slots: HashMap<u32, Slot>,
}

impl Dispatch for SlotDispatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn graph(&self) -> Option<&ProtocolGraph> {
        Some(&self.graph)
    }

    fn process(&self, frame: &Frame, upstream: &Upstream) -> Result<Transition, Fault> {
        let slot = self
            .slots
            .get(&frame.message_id)
            .ok_or_else(|| slot_not_found(&self.name, frame.message_id))?;
        let args = frame.args.clone();

        match slot {
            Slot::Blocking(handler) => {
                match catch_unwind(AssertUnwindSafe(|| handler(args))) {
                    Ok(Ok(value)) => {
                        if let Err(fault) = upstream.value(value) {
                            debug!(fault = %fault, "blocking reply dropped");
                        }
                    }
                    Ok(Err(fault)) => {
                        let _ = upstream.error(&fault);
                    }
                    Err(_) => {
                        error!(dispatch = %self.name, id = frame.message_id, "slot panicked");
                        let _ = upstream.error(&uncaught());
                    }
                }
                Ok(Transition::Terminate)
            }
            Slot::Deferred(handler) => {
                let handle = DeferredHandle::new(upstream.clone());
                match catch_unwind(AssertUnwindSafe(|| handler(args, handle.clone()))) {
                    Ok(Ok(())) => {}
                    Ok(Err(fault)) => {
                        let _ = handle.abort(&fault);
                    }
                    Err(_) => {
                        error!(dispatch = %self.name, id = frame.message_id, "slot panicked");
                        let _ = handle.abort(&uncaught());
                    }
                }
                Ok(Transition::Terminate)
            }
            Slot::Streamed(handler) => {
                let handle = StreamHandle::new(upstream.clone());
                match catch_unwind(AssertUnwindSafe(|| handler(args, handle.clone()))) {
                    Ok(Ok(transition)) => Ok(transition),
                    Ok(Err(fault)) => {
                        let _ = handle.error(&fault);
                        Ok(Transition::Terminate)
                    }
                    Err(_) => {
                        error!(dispatch = %self.name, id = frame.message_id, "slot panicked");
                        let _ = handle.error(&uncaught());
                        Ok(Transition::Terminate)
                    }
                }
            }
            Slot::Mute(handler) => {
                // Mute slots never answer; the tx side closes right away.
                upstream.close();
                match catch_unwind(AssertUnwindSafe(|| handler(args))) {
                    Ok(Ok(())) => {}
                    Ok(Err(fault)) => {
                        debug!(dispatch = %self.name, fault = %fault, "mute slot failed");
                    }
                    Err(_) => {
                        error!(dispatch = %self.name, id = frame.message_id, "mute slot panicked");
                    }
                }
                Ok(Transition::Terminate)
            }
        }
    }
}

/// Builder for [`SlotDispatch`] and its protocol graph.
pub struct DispatchBuilder {
    name: String,
    graph: ProtocolBuilder,
    slots: HashMap<u32, Slot>,
}

impl DispatchBuilder {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        let name = name.into();
        Self {
            graph: ProtocolBuilder::new(name.clone(), version),
            name,
            slots: HashMap::new(),
        }
    }

    pub fn blocking<F>(mut self, id: u32, alias: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Fault> + Send + Sync + 'static,
    {
        self.slots.insert(id, Slot::Blocking(Arc::new(handler)));
        self.graph = self.graph.method_full(
            id,
            alias,
            GraphRef::None,
            GraphRef::Graph(Box::new(drover_core::graph::primitive_graph())),
        );
        self
    }

    pub fn deferred<F>(mut self, id: u32, alias: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>, DeferredHandle) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.slots.insert(id, Slot::Deferred(Arc::new(handler)));
        self.graph = self.graph.method_full(
            id,
            alias,
            GraphRef::None,
            GraphRef::Graph(Box::new(drover_core::graph::primitive_graph())),
        );
        self
    }

    pub fn streamed<F>(mut self, id: u32, alias: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>, StreamHandle) -> Result<Transition, Fault> + Send + Sync + 'static,
    {
        self.slots.insert(id, Slot::Streamed(Arc::new(handler)));
        self.graph = self.graph.method_full(
            id,
            alias,
            GraphRef::Graph(Box::new(drover_core::graph::streaming_graph())),
            GraphRef::Graph(Box::new(drover_core::graph::streaming_graph())),
        );
        self
    }

    pub fn mute<F>(mut self, id: u32, alias: &str, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.slots.insert(id, Slot::Mute(Arc::new(handler)));
        self.graph = self.graph.method(id, alias);
        self
    }

    pub fn build(self) -> Arc<SlotDispatch> {
        Arc::new(SlotDispatch {
            name: self.name,
            graph: self.graph.build(),
            slots: self.slots,
        })
    }
}

#[cfg(test)]
#[path = "slot_tests.rs"]
mod tests;
