//! Directed, bounded message channels between nodes.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use simnet_types::NodeId;

/// Default buffered messages per directed edge.
pub const EDGE_CAPACITY: usize = 10;

/// Sending half of a directed edge, stored on the `from` node.
pub struct Outlet {
    /// Receiving node.
    pub to: NodeId,
    pub(crate) tx: mpsc::Sender<serde_json::Value>,
}

/// Receiving half of a directed edge, stored on the `to` node.
///
/// The receiver sits behind an async mutex: the node that owns the inlet
/// locks it for the duration of one await batch, so no two batches ever
/// compete for the same messages.
pub struct Inlet {
    /// Sending node.
    pub from: NodeId,
    pub(crate) rx: Arc<Mutex<mpsc::Receiver<serde_json::Value>>>,
}

/// Creates the two halves of a directed edge from `from` to `to`.
#[must_use]
pub fn link(from: NodeId, to: NodeId, capacity: usize) -> (Outlet, Inlet) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Outlet { to, tx },
        Inlet {
            from,
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn carries_messages_in_order() {
        let (outlet, inlet) = link(NodeId::new(0), NodeId::new(1), 2);
        assert_eq!(outlet.to, NodeId::new(1));
        assert_eq!(inlet.from, NodeId::new(0));

        outlet.tx.send(serde_json::json!(1)).await.expect("send");
        outlet.tx.send(serde_json::json!(2)).await.expect("send");

        let mut rx = inlet.rx.lock().await;
        assert_eq!(rx.recv().await, Some(serde_json::json!(1)));
        assert_eq!(rx.recv().await, Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let (outlet, _inlet) = link(NodeId::new(0), NodeId::new(1), 2);
        outlet.tx.send(serde_json::json!("a")).await.expect("send");
        outlet.tx.send(serde_json::json!("b")).await.expect("send");
        assert!(outlet.tx.try_send(serde_json::json!("c")).is_err());
    }

    #[tokio::test]
    async fn dropped_inlet_fails_sends() {
        let (outlet, inlet) = link(NodeId::new(0), NodeId::new(1), 1);
        drop(inlet);
        assert!(outlet.tx.send(serde_json::json!("x")).await.is_err());
    }
}
