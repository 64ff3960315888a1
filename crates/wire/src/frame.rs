// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame and header value types.

use std::fmt;

use rmpv::Value;

/// One wire header. Names and values are raw byte strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl Header {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Size of this header in the HPACK table accounting scheme.
    pub fn table_size(&self) -> usize {
        self.name.len() + self.value.len() + crate::hpack::ENTRY_OVERHEAD
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.value)
        )
    }
}

/// A single framed message.
///
/// Channel 0 is reserved for session-wide control; positive ids are
/// allocated monotonically by the channel's initiator.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub channel: u64,
    pub message_id: u32,
    pub args: Vec<Value>,
    pub headers: Vec<Header>,
}

impl Frame {
    pub fn new(channel: u64, message_id: u32, args: Vec<Value>) -> Self {
        Self {
            channel,
            message_id,
            args,
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = headers;
        self
    }

    /// A protocol `value` frame.
    pub fn value(channel: u64, payload: Value) -> Self {
        Self::new(channel, drover_core::graph::primitive::VALUE, vec![payload])
    }

    /// A protocol `error` frame carrying `[code, reason]`.
    pub fn error(channel: u64, code: u32, reason: &str) -> Self {
        Self::new(
            channel,
            drover_core::graph::primitive::ERROR,
            vec![Value::from(code), Value::from(reason)],
        )
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
