//! Topic catalog.
//!
//! Topics are direction-agnostic names: `ConnectNodes` reflects a control
//! input regardless of who publishes it, `NetworkResize` an engine output
//! regardless of who listens. The wire tags keep the original kebab-case
//! form so external tooling can log them verbatim.

use serde::{Deserialize, Serialize};

/// Named channel on the event bus.
///
/// | Topic | Payload | Direction |
/// |---|---|---|
/// | `NodeDataChange` | `Payload::NodeData` | in |
/// | `ConnectNodes` / `DisconnectNodes` | `Payload::Edge` | in |
/// | `StartNodes` / `StopNodes` / `DebugNodes` / `ContinueNodes` | `Payload::Empty` | in |
/// | `CodeChange` | `Payload::Code` | in |
/// | `NodeCntChange` | `Payload::Count` | in |
/// | `NetworkConnections` | `Payload::Edges` | out |
/// | `NetworkResize` | `Payload::Resize` | out |
/// | `NodeOutput` | `Payload::NodeOutput` | out |
/// | `SentTo` | `Payload::Sent` | out (debug) |
/// | `AwaitStart` | `Payload::Node` | out (debug) |
/// | `AwaitEnd` | `Payload::Batch` | out (debug) |
///
/// The table is the convention, not a hard binding: the bus only enforces
/// whatever shape a topic's first bind or publish establishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Replace one node's opaque payload value.
    NodeDataChange,
    /// Add a directed edge.
    ConnectNodes,
    /// Remove a directed edge.
    DisconnectNodes,
    /// Start user code on every node.
    StartNodes,
    /// Stop user code on every node, collecting output.
    StopNodes,
    /// Start user code with the single-step protocol enabled.
    DebugNodes,
    /// Release every node paused by the step protocol.
    ContinueNodes,
    /// Replace the user code string.
    CodeChange,
    /// Resize the network to a new node count.
    NodeCntChange,
    /// The current directed edge set.
    NetworkConnections,
    /// The edge set and node count after a resize.
    NetworkResize,
    /// One node's captured log and result after a stop.
    NodeOutput,
    /// Debug: a node is about to send a message.
    SentTo,
    /// Debug: a node is entering an await batch.
    AwaitStart,
    /// Debug: a node finished an await batch.
    AwaitEnd,
}

impl Topic {
    /// Returns the wire tag for this topic.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::NodeDataChange => "node-data-change",
            Self::ConnectNodes => "connect-nodes",
            Self::DisconnectNodes => "disconnect-nodes",
            Self::StartNodes => "start-nodes",
            Self::StopNodes => "stop-nodes",
            Self::DebugNodes => "debug-nodes",
            Self::ContinueNodes => "continue-nodes",
            Self::CodeChange => "code-change",
            Self::NodeCntChange => "node-count-change",
            Self::NetworkConnections => "network-connections",
            Self::NetworkResize => "network-resize",
            Self::NodeOutput => "node-output",
            Self::SentTo => "sent-to",
            Self::AwaitStart => "await-start",
            Self::AwaitEnd => "await-end",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_kebab_case() {
        for topic in [
            Topic::NodeDataChange,
            Topic::ConnectNodes,
            Topic::DisconnectNodes,
            Topic::StartNodes,
            Topic::StopNodes,
            Topic::DebugNodes,
            Topic::ContinueNodes,
            Topic::CodeChange,
            Topic::NodeCntChange,
            Topic::NetworkConnections,
            Topic::NetworkResize,
            Topic::NodeOutput,
            Topic::SentTo,
            Topic::AwaitStart,
            Topic::AwaitEnd,
        ] {
            let tag = topic.tag();
            assert!(!tag.is_empty());
            assert!(
                tag.chars().all(|c| c.is_ascii_lowercase() || c == '-'),
                "tag {tag} is not kebab-case"
            );
            assert_eq!(topic.to_string(), tag);
        }
    }
}
