//! Lifecycle signals and the shared delivery queue.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Lifecycle command understood by a node run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Run the current user code.
    Start,
    /// Cancel the running code and publish its output.
    Stop,
    /// Run the current user code with the single-step protocol enabled.
    Debug,
    /// Shut the node down for good.
    Term,
}

/// One bounded queue shared by every node run loop of a generation.
///
/// [`broadcast`](Self::broadcast) pushes one copy of a signal per node;
/// each copy is consumed by exactly one run loop. A resize replaces the
/// queue wholesale so signals never cross generations.
#[derive(Clone)]
pub struct SignalQueue {
    tx: mpsc::Sender<Signal>,
    rx: Arc<Mutex<mpsc::Receiver<Signal>>>,
}

impl SignalQueue {
    /// Creates a queue buffering up to `capacity` signals.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Pushes `copies` copies of `signal`, waiting for queue space.
    pub async fn broadcast(&self, signal: Signal, copies: usize) {
        debug!(?signal, copies, "broadcasting signal");
        for _ in 0..copies {
            if self.tx.send(signal).await.is_err() {
                break;
            }
        }
    }

    /// Takes the next signal, or `None` once the queue is closed.
    pub async fn recv(&self) -> Option<Signal> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn each_copy_consumed_once() {
        let queue = SignalQueue::new(8);
        queue.broadcast(Signal::Start, 3).await;
        queue.broadcast(Signal::Stop, 1).await;

        let mut got = Vec::new();
        for _ in 0..4 {
            got.push(queue.recv().await.expect("signal"));
        }
        assert_eq!(
            got,
            vec![Signal::Start, Signal::Start, Signal::Start, Signal::Stop]
        );
    }

    #[tokio::test]
    async fn concurrent_consumers_split_the_broadcast() {
        let queue = SignalQueue::new(4);
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.recv().await })
            })
            .collect();

        queue.broadcast(Signal::Term, 3).await;
        for consumer in consumers {
            assert_eq!(consumer.await.expect("join"), Some(Signal::Term));
        }
    }
}
