//! Network-level diagnostics.
//!
//! Invalid control inputs are logged and ignored; these errors carry the
//! codes those logs use.

use simnet_bus::Edge;
use simnet_types::{ErrorCode, NodeId};

/// Why a control input was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    /// A node id outside the current network.
    #[error("node {node} out of range (network has {count} nodes)")]
    InvalidNode {
        /// The offending id.
        node: NodeId,
        /// Current node count.
        count: usize,
    },
    /// An edge with an endpoint outside the current network.
    #[error("edge {edge} out of range (network has {count} nodes)")]
    InvalidEdge {
        /// The offending edge.
        edge: Edge,
        /// Current node count.
        count: usize,
    },
    /// A disconnect for an edge that is not present.
    #[error("edge {edge} not present")]
    UnknownEdge {
        /// The missing edge.
        edge: Edge,
    },
}

impl ErrorCode for NetError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidNode { .. } => "NET_INVALID_NODE",
            Self::InvalidEdge { .. } => "NET_INVALID_EDGE",
            Self::UnknownEdge { .. } => "NET_UNKNOWN_EDGE",
        }
    }

    fn is_recoverable(&self) -> bool {
        // The offending command is dropped; the network keeps running.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simnet_types::assert_error_codes;

    #[test]
    fn codes_share_the_net_prefix() {
        let edge = Edge::new(0, 1);
        assert_error_codes(
            &[
                NetError::InvalidNode {
                    node: NodeId::new(9),
                    count: 2,
                },
                NetError::InvalidEdge { edge, count: 2 },
                NetError::UnknownEdge { edge },
            ],
            "NET_",
        );
    }

    #[test]
    fn all_recoverable() {
        assert!(NetError::UnknownEdge {
            edge: Edge::new(0, 1)
        }
        .is_recoverable());
    }
}
