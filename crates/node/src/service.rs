// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-app service protocol, as seen by clients.

use std::sync::Arc;

use rmpv::Value;

use drover_core::{codes, Clock, Fault, SlaveId};
use drover_rpc::{DispatchBuilder, SlotDispatch, Transition};

use crate::overseer::Overseer;

/// App service messages.
pub mod app {
    /// `enqueue(event, tag?) → stream<chunk|error|choke>`.
    pub const ENQUEUE: u32 = 0;
    /// `info() → dynamic object`.
    pub const INFO: u32 = 1;
}

/// Build the dispatch served on the app's client-facing channels.
pub fn app_dispatch<C: Clock>(overseer: &Arc<Overseer<C>>) -> Arc<SlotDispatch> {
    let name = format!("app/{}", overseer.name());
    let enqueue_overseer = Arc::clone(overseer);
    let info_overseer = Arc::clone(overseer);

    DispatchBuilder::new(name, 1)
        .streamed(app::ENQUEUE, "enqueue", move |args, handle| {
            let event = args
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Fault::new(codes::INVOCATION_ERROR, "enqueue expects an event name")
                })?
                .to_string();
            let tag = args
                .get(1)
                .and_then(Value::as_str)
                .filter(|tag| !tag.is_empty())
                .map(SlaveId::new);

            let dispatch = enqueue_overseer.enqueue(handle.upstream().clone(), event, tag)?;
            Ok(Transition::Replace(dispatch))
        })
        .blocking(app::INFO, "info", move |_| Ok(info_overseer.info()))
        .build()
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
