//! Single-step protocol primitive.
//!
//! In debug mode a node pauses after announcing a send or a finished
//! await batch, and a `ContinueNodes` event releases every node paused at
//! that moment. The ticket closes the announce/pause gap: a node takes a
//! ticket before publishing its debug event, so a release that lands
//! between the publish and the pause is still observed.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Generation marker taken before a debug event is published.
#[derive(Debug, Clone, Copy)]
pub struct StepTicket(u64);

/// Pauses and releases nodes running under the single-step protocol.
pub struct StepController {
    notify: Notify,
    generation: AtomicU64,
    paused: AtomicUsize,
}

impl StepController {
    /// Creates a controller with no paused nodes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
            generation: AtomicU64::new(0),
            paused: AtomicUsize::new(0),
        }
    }

    /// Captures the current release generation.
    #[must_use]
    pub fn ticket(&self) -> StepTicket {
        StepTicket(self.generation.load(Ordering::SeqCst))
    }

    /// Blocks until a release newer than `ticket` arrives or `cancel`
    /// fires. Returns immediately if one already arrived.
    pub async fn pause(&self, ticket: StepTicket, cancel: &CancellationToken) {
        self.paused.fetch_add(1, Ordering::SeqCst);
        while self.generation.load(Ordering::SeqCst) == ticket.0 && !cancel.is_cancelled() {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            // Re-check after registering so a concurrent release is not lost.
            if self.generation.load(Ordering::SeqCst) != ticket.0 || cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => {}
            }
        }
        self.paused.fetch_sub(1, Ordering::SeqCst);
    }

    /// Releases every currently paused node and invalidates outstanding
    /// tickets.
    pub fn release(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Number of nodes currently paused.
    #[must_use]
    pub fn paused(&self) -> usize {
        self.paused.load(Ordering::SeqCst)
    }
}

impl Default for StepController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    async fn wait_for_paused(step: &StepController, want: usize) {
        for _ in 0..100 {
            if step.paused() == want {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("paused count never reached {want}, got {}", step.paused());
    }

    #[tokio::test]
    async fn release_wakes_paused_nodes() {
        let step = Arc::new(StepController::new());
        let cancel = CancellationToken::new();

        let pauses: Vec<_> = (0..2)
            .map(|_| {
                let step = Arc::clone(&step);
                let cancel = cancel.clone();
                let ticket = step.ticket();
                tokio::spawn(async move { step.pause(ticket, &cancel).await })
            })
            .collect();

        wait_for_paused(&step, 2).await;
        step.release();

        for pause in pauses {
            timeout(Duration::from_secs(1), pause)
                .await
                .expect("pause never released")
                .expect("pause panicked");
        }
        assert_eq!(step.paused(), 0);
    }

    #[tokio::test]
    async fn release_between_ticket_and_pause_is_not_lost() {
        let step = StepController::new();
        let cancel = CancellationToken::new();

        let ticket = step.ticket();
        step.release();

        timeout(Duration::from_secs(1), step.pause(ticket, &cancel))
            .await
            .expect("stale ticket should not pause");
    }

    #[tokio::test]
    async fn cancellation_unblocks_a_pause() {
        let step = Arc::new(StepController::new());
        let cancel = CancellationToken::new();

        let ticket = step.ticket();
        let pause = {
            let step = Arc::clone(&step);
            let cancel = cancel.clone();
            tokio::spawn(async move { step.pause(ticket, &cancel).await })
        };

        wait_for_paused(&step, 1).await;
        cancel.cancel();

        timeout(Duration::from_secs(1), pause)
            .await
            .expect("cancelled pause never returned")
            .expect("pause panicked");
        assert_eq!(step.paused(), 0);
    }
}
