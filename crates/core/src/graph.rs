// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol graphs.
//!
//! A protocol graph describes the dispatch tree of a service protocol:
//! for each message id, an alias plus the graphs the channel transitions
//! to on each side. Graphs are built at registration time with
//! [`ProtocolBuilder`] and served verbatim by `resolve` for
//! introspection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Where a channel side goes after a message is processed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GraphRef {
    /// The side is terminal: no further messages.
    #[default]
    None,
    /// The side stays on the current graph (recursive slot).
    Recurrent,
    /// The side transitions to another graph.
    Graph(Box<ProtocolGraph>),
}

/// One protocol method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub alias: String,
    /// Graph installed on the receiving side after this message.
    #[serde(default)]
    pub downstream: GraphRef,
    /// Graph the sender of this message continues with.
    #[serde(default)]
    pub upstream: GraphRef,
}

/// Immutable dispatch tree of a protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolGraph {
    pub name: String,
    pub version: u64,
    pub nodes: BTreeMap<u32, GraphNode>,
}

impl ProtocolGraph {
    pub fn node(&self, message_id: u32) -> Option<&GraphNode> {
        self.nodes.get(&message_id)
    }

    pub fn contains(&self, message_id: u32) -> bool {
        self.nodes.contains_key(&message_id)
    }
}

/// Registration-time builder for [`ProtocolGraph`].
#[derive(Debug)]
pub struct ProtocolBuilder {
    name: String,
    version: u64,
    nodes: BTreeMap<u32, GraphNode>,
}

impl ProtocolBuilder {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self {
            name: name.into(),
            version,
            nodes: BTreeMap::new(),
        }
    }

    /// Register a method terminal on both sides.
    pub fn method(self, id: u32, alias: impl Into<String>) -> Self {
        self.method_full(id, alias, GraphRef::None, GraphRef::None)
    }

    /// Register a method with explicit transition graphs.
    pub fn method_full(
        mut self,
        id: u32,
        alias: impl Into<String>,
        downstream: GraphRef,
        upstream: GraphRef,
    ) -> Self {
        self.nodes.insert(
            id,
            GraphNode {
                alias: alias.into(),
                downstream,
                upstream,
            },
        );
        self
    }

    pub fn build(self) -> ProtocolGraph {
        ProtocolGraph {
            name: self.name,
            version: self.version,
            nodes: self.nodes,
        }
    }
}

/// The primitive response protocol: one `value` or one `error`.
pub fn primitive_graph() -> ProtocolGraph {
    ProtocolBuilder::new("primitive", 1)
        .method(crate::graph::primitive::VALUE, "value")
        .method(crate::graph::primitive::ERROR, "error")
        .build()
}

/// The streaming protocol: `chunk*` then `error` or `choke`.
pub fn streaming_graph() -> ProtocolGraph {
    ProtocolBuilder::new("streaming", 1)
        .method_full(
            crate::graph::streaming::CHUNK,
            "chunk",
            GraphRef::Recurrent,
            GraphRef::Recurrent,
        )
        .method(crate::graph::streaming::ERROR, "error")
        .method(crate::graph::streaming::CHOKE, "choke")
        .build()
}

/// Well-known ids of the primitive protocol.
pub mod primitive {
    pub const VALUE: u32 = 0;
    pub const ERROR: u32 = 1;
}

/// Well-known ids of the streaming protocol.
pub mod streaming {
    pub const CHUNK: u32 = 0;
    pub const ERROR: u32 = 1;
    pub const CHOKE: u32 = 2;
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
