//! Identifier types for simnet.
//!
//! Node ids are dense indices assigned by the network: a network of N
//! nodes always uses ids `0..N-1`, and a full resize reassigns the whole
//! range. They are wrapped in a newtype anyway — callback payloads are
//! only checked at runtime, so a bare `usize` would silently survive a
//! refactor that a wrapped id turns into a compile error.

use serde::{Deserialize, Serialize};

/// Identifier of a node in the emulated network.
///
/// Ids are dense: a network of `n` nodes uses exactly `0..n-1`. They are
/// not stable across a resize — every resize discards and recreates the
/// full node set.
///
/// # Example
///
/// ```
/// use simnet_types::NodeId;
///
/// let id = NodeId::new(3);
/// assert_eq!(id.index(), 3);
/// assert_eq!(id.to_string(), "node-3");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// Wraps a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_index() {
        let id = NodeId::new(7);
        assert_eq!(id.index(), 7);
        assert_eq!(NodeId::from(7), id);
    }

    #[test]
    fn display_format() {
        assert_eq!(NodeId::new(0).to_string(), "node-0");
        assert_eq!(NodeId::new(12).to_string(), "node-12");
    }

    #[test]
    fn ordering_follows_index() {
        assert!(NodeId::new(1) < NodeId::new(2));
    }

    #[test]
    fn serde_transparent() {
        let id = NodeId::new(4);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "4");
        let back: NodeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
