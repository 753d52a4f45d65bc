//! Network construction parameters.

use serde::{Deserialize, Serialize};

use crate::edge::EDGE_CAPACITY;

/// Tunables for [`NetworkHandle::spawn`](crate::NetworkHandle::spawn).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Node count before the first resize.
    pub initial_nodes: usize,
    /// Buffered messages per directed edge.
    pub edge_capacity: usize,
    /// Buffered lifecycle signals in the shared queue.
    pub signal_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            initial_nodes: 2,
            edge_capacity: EDGE_CAPACITY,
            signal_capacity: 16,
        }
    }
}
