//! Event payloads and their shape discriminants.
//!
//! The original design checked callback signatures against publish
//! arguments with runtime reflection. Here the payload space is a closed
//! tagged union instead: [`Payload`] enumerates every shape the engine
//! speaks, and [`PayloadKind`] is the discriminant a topic's contract is
//! expressed in. "Shape fixed on first use" survives, reflection does not.

use serde::{Deserialize, Serialize};
use simnet_types::NodeId;

use crate::Topic;

/// A directed edge between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Sending side.
    pub from: NodeId,
    /// Receiving side.
    pub to: NodeId,
}

impl Edge {
    /// Creates an edge from `from` to `to`.
    #[must_use]
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// One message transfer with provenance, as surfaced by the debug
/// protocol (`SentTo` before a send, `AwaitEnd` batches after an await).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendTask {
    /// Sender.
    pub from: NodeId,
    /// Receiver.
    pub to: NodeId,
    /// Message data.
    pub data: serde_json::Value,
}

/// The data carried by an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// No data (pure notifications: start/stop/debug/continue).
    Empty,
    /// New opaque payload value for one node.
    NodeData {
        /// Node whose data changes.
        target: NodeId,
        /// The new value.
        data: serde_json::Value,
    },
    /// A single directed edge (connect/disconnect requests).
    Edge(Edge),
    /// A user code string.
    Code(String),
    /// A node count.
    Count(usize),
    /// The full directed edge set.
    Edges(Vec<Edge>),
    /// Edge set and node count after a resize.
    Resize {
        /// Edges that survived the resize.
        edges: Vec<Edge>,
        /// The new node count.
        count: usize,
    },
    /// Captured output of one node's finished execution.
    NodeOutput {
        /// Captured stdout/stderr of the run.
        log: String,
        /// The user function's return value, `Null` on error.
        result: serde_json::Value,
        /// Which node produced it.
        node: NodeId,
    },
    /// A single pending transfer (debug).
    Sent(SendTask),
    /// A bare node id (debug: await batch starting).
    Node(NodeId),
    /// A completed await batch with provenance (debug).
    Batch(Vec<SendTask>),
}

impl Payload {
    /// Returns the shape discriminant used for contract checking.
    #[must_use]
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Empty => PayloadKind::Empty,
            Self::NodeData { .. } => PayloadKind::NodeData,
            Self::Edge(_) => PayloadKind::Edge,
            Self::Code(_) => PayloadKind::Code,
            Self::Count(_) => PayloadKind::Count,
            Self::Edges(_) => PayloadKind::Edges,
            Self::Resize { .. } => PayloadKind::Resize,
            Self::NodeOutput { .. } => PayloadKind::NodeOutput,
            Self::Sent(_) => PayloadKind::Sent,
            Self::Node(_) => PayloadKind::Node,
            Self::Batch(_) => PayloadKind::Batch,
        }
    }
}

/// Shape discriminant of a [`Payload`]. A topic's contract is one of
/// these, fixed by the topic's first bind or publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    /// Shape of [`Payload::Empty`].
    Empty,
    /// Shape of [`Payload::NodeData`].
    NodeData,
    /// Shape of [`Payload::Edge`].
    Edge,
    /// Shape of [`Payload::Code`].
    Code,
    /// Shape of [`Payload::Count`].
    Count,
    /// Shape of [`Payload::Edges`].
    Edges,
    /// Shape of [`Payload::Resize`].
    Resize,
    /// Shape of [`Payload::NodeOutput`].
    NodeOutput,
    /// Shape of [`Payload::Sent`].
    Sent,
    /// Shape of [`Payload::Node`].
    Node,
    /// Shape of [`Payload::Batch`].
    Batch,
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A published event: a topic plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Which topic this event belongs to.
    pub topic: Topic,
    /// The event data.
    pub payload: Payload,
}

impl Event {
    /// Creates an event.
    #[must_use]
    pub fn new(topic: Topic, payload: Payload) -> Self {
        Self { topic, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Payload::Empty.kind(), PayloadKind::Empty);
        assert_eq!(Payload::Code("x".into()).kind(), PayloadKind::Code);
        assert_eq!(
            Payload::Edge(Edge::new(0, 1)).kind(),
            PayloadKind::Edge
        );
        assert_eq!(
            Payload::Resize {
                edges: vec![],
                count: 2
            }
            .kind(),
            PayloadKind::Resize
        );
        assert_ne!(Payload::Count(1).kind(), PayloadKind::Node);
    }

    #[test]
    fn edge_display() {
        let edge = Edge::new(0, 1);
        assert_eq!(edge.to_string(), "node-0 -> node-1");
    }

    #[test]
    fn payload_serde_roundtrip() {
        let payload = Payload::Sent(SendTask {
            from: NodeId::new(0),
            to: NodeId::new(1),
            data: serde_json::json!({"k": "v"}),
        });
        let json = serde_json::to_string(&payload).expect("serialize");
        let back: Payload = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, payload);
        assert_eq!(back.kind(), PayloadKind::Sent);
    }
}
