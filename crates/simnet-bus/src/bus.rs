//! The bus task and its handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{BusError, Event, Payload, PayloadKind, Topic};

/// Callback invoked with each matching payload.
///
/// Callbacks run inside the bus task: keep them short and push real work
/// onto a channel. They may re-enter the bus through a cloned
/// [`BusHandle`] (non-blocking operations only; a blocking `*_awaited`
/// call from inside a callback would wait on the very task running it).
pub type Callback = Box<dyn FnMut(&Payload) + Send>;

/// Identity of one registered callback, used for [`BusHandle::unbind`].
///
/// The original design unbound by function reference identity; boxed
/// closures have no usable identity, so the bus mints an id per bind
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

impl BindingId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

enum BusCommand {
    Bind {
        topic: Topic,
        kind: PayloadKind,
        id: BindingId,
        callback: Callback,
        reply: Option<oneshot::Sender<bool>>,
    },
    Publish {
        event: Event,
        reply: Option<oneshot::Sender<bool>>,
    },
    Unbind {
        topic: Topic,
        id: BindingId,
        reply: Option<oneshot::Sender<bool>>,
    },
    Wait {
        topic: Topic,
        waiter: oneshot::Sender<Payload>,
    },
}

#[derive(Default)]
struct TopicState {
    /// Payload shape fixed by the first bind or publish, `None` until then.
    contract: Option<PayloadKind>,
    /// Callbacks in registration order.
    callbacks: Vec<(BindingId, Callback)>,
    /// Most recent published payload, replayed to late binders.
    recent: Option<Payload>,
    /// One-shot waiters fulfilled (and cleared) by the next publish.
    waiters: Vec<oneshot::Sender<Payload>>,
}

/// The event bus. One spawned task owns all per-topic state; everything
/// else talks to it through [`BusHandle`]s.
pub struct EventBus {
    topics: HashMap<Topic, TopicState>,
}

impl EventBus {
    /// Spawns the bus task and returns a handle to it.
    ///
    /// The task runs until every handle is dropped.
    #[must_use]
    pub fn spawn() -> BusHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Self {
            topics: HashMap::new(),
        };
        tokio::spawn(bus.run(rx));
        BusHandle {
            tx,
            next_binding: Arc::new(AtomicU64::new(1)),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BusCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                BusCommand::Bind {
                    topic,
                    kind,
                    id,
                    callback,
                    reply,
                } => {
                    let ok = self.bind(topic, kind, id, callback);
                    if let Some(reply) = reply {
                        let _ = reply.send(ok);
                    }
                }
                BusCommand::Publish { event, reply } => {
                    let ok = self.publish(event);
                    if let Some(reply) = reply {
                        let _ = reply.send(ok);
                    }
                }
                BusCommand::Unbind { topic, id, reply } => {
                    let ok = self.unbind(topic, id);
                    if let Some(reply) = reply {
                        let _ = reply.send(ok);
                    }
                }
                BusCommand::Wait { topic, waiter } => {
                    self.topics.entry(topic).or_default().waiters.push(waiter);
                }
            }
        }
        debug!("event bus task stopped");
    }

    fn bind(&mut self, topic: Topic, kind: PayloadKind, id: BindingId, mut cb: Callback) -> bool {
        let state = self.topics.entry(topic).or_default();
        match state.contract {
            None => state.contract = Some(kind),
            Some(expected) if expected != kind => {
                warn!(
                    %topic,
                    error = %BusError::ContractMismatch { topic, expected, got: kind },
                    "bind rejected"
                );
                return false;
            }
            Some(_) => {}
        }

        // Late-subscriber replay: the most recent event, exactly once.
        if let Some(recent) = &state.recent {
            if recent.kind() == kind {
                cb(recent);
            }
        }

        state.callbacks.push((id, cb));
        debug!(%topic, ?id, "bound callback");
        true
    }

    fn publish(&mut self, event: Event) -> bool {
        let Event { topic, payload } = event;
        let got = payload.kind();
        let state = self.topics.entry(topic).or_default();
        let expected = *state.contract.get_or_insert(got);

        // Recorded before the contract check, matching the original:
        // even a rejected publish becomes the topic's most recent event.
        state.recent = Some(payload.clone());

        if expected != got {
            warn!(
                %topic,
                error = %BusError::ContractMismatch { topic, expected, got },
                "publish rejected"
            );
            return false;
        }

        debug!(%topic, callbacks = state.callbacks.len(), "publish");
        for (_, cb) in &mut state.callbacks {
            cb(&payload);
        }

        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(payload.clone());
        }
        true
    }

    fn unbind(&mut self, topic: Topic, id: BindingId) -> bool {
        let Some(state) = self.topics.get_mut(&topic) else {
            debug!(%topic, error = %BusError::UnknownBinding { topic, binding: id }, "unbind");
            return false;
        };
        let before = state.callbacks.len();
        state.callbacks.retain(|(bound, _)| *bound != id);
        if state.callbacks.len() == before {
            debug!(%topic, error = %BusError::UnknownBinding { topic, binding: id }, "unbind");
            return false;
        }
        debug!(%topic, ?id, "unbound callback");
        true
    }
}

/// Cloneable handle to the bus task.
///
/// Every operation has a fire-and-forget form and a blocking `*_awaited`
/// form that reports success. Failure is a boolean plus a logged
/// diagnostic, never a panic.
#[derive(Clone)]
pub struct BusHandle {
    tx: mpsc::UnboundedSender<BusCommand>,
    next_binding: Arc<AtomicU64>,
}

impl BusHandle {
    fn mint_id(&self) -> BindingId {
        BindingId::from_raw(self.next_binding.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers `callback` for `topic`, expecting `kind` payloads.
    ///
    /// Fire-and-forget: the bind (and any replay of the topic's most
    /// recent event) happens on the bus's own schedule. A contract
    /// conflict is logged there; the returned [`BindingId`] is then dead.
    pub fn bind(
        &self,
        topic: Topic,
        kind: PayloadKind,
        callback: impl FnMut(&Payload) + Send + 'static,
    ) -> BindingId {
        let id = self.mint_id();
        let sent = self.tx.send(BusCommand::Bind {
            topic,
            kind,
            id,
            callback: Box::new(callback),
            reply: None,
        });
        if sent.is_err() {
            warn!(%topic, error = %BusError::Closed, "bind dropped");
        }
        id
    }

    /// Registers `callback` for `topic` and waits for the outcome.
    ///
    /// On success the topic's most recent event (if any) has already been
    /// replayed to the callback. Returns `None` on contract conflict or
    /// when the bus is closed.
    pub async fn bind_awaited(
        &self,
        topic: Topic,
        kind: PayloadKind,
        callback: impl FnMut(&Payload) + Send + 'static,
    ) -> Option<BindingId> {
        let id = self.mint_id();
        let (reply, rx) = oneshot::channel();
        let sent = self.tx.send(BusCommand::Bind {
            topic,
            kind,
            id,
            callback: Box::new(callback),
            reply: Some(reply),
        });
        if sent.is_err() {
            warn!(%topic, error = %BusError::Closed, "bind dropped");
            return None;
        }
        match rx.await {
            Ok(true) => Some(id),
            _ => None,
        }
    }

    /// Publishes `event` on the bus's own schedule.
    pub fn publish(&self, event: Event) {
        let topic = event.topic;
        if self.tx.send(BusCommand::Publish { event, reply: None }).is_err() {
            warn!(%topic, error = %BusError::Closed, "publish dropped");
        }
    }

    /// Publishes `event` and waits for the outcome: `true` once every
    /// bound callback ran and all one-shot waiters were fulfilled.
    pub async fn publish_awaited(&self, event: Event) -> bool {
        let topic = event.topic;
        let (reply, rx) = oneshot::channel();
        let sent = self.tx.send(BusCommand::Publish {
            event,
            reply: Some(reply),
        });
        if sent.is_err() {
            warn!(%topic, error = %BusError::Closed, "publish dropped");
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Removes a previously bound callback. No-op if unknown.
    pub fn unbind(&self, topic: Topic, id: BindingId) {
        if self
            .tx
            .send(BusCommand::Unbind {
                topic,
                id,
                reply: None,
            })
            .is_err()
        {
            warn!(%topic, error = %BusError::Closed, "unbind dropped");
        }
    }

    /// Removes a previously bound callback, reporting whether it was
    /// found.
    pub async fn unbind_awaited(&self, topic: Topic, id: BindingId) -> bool {
        let (reply, rx) = oneshot::channel();
        let sent = self.tx.send(BusCommand::Unbind {
            topic,
            id,
            reply: Some(reply),
        });
        if sent.is_err() {
            warn!(%topic, error = %BusError::Closed, "unbind dropped");
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Blocks until the next publish to `topic`, returning its payload,
    /// or until `cancel` fires, returning `None`.
    ///
    /// The waiter is one-shot: a qualifying publish fulfills every waiter
    /// registered at that moment and clears the list.
    pub async fn await_event(&self, cancel: &CancellationToken, topic: Topic) -> Option<Payload> {
        let (waiter, rx) = oneshot::channel();
        if self.tx.send(BusCommand::Wait { topic, waiter }).is_err() {
            warn!(%topic, error = %BusError::Closed, "await dropped");
            return None;
        }
        debug!(%topic, "awaiting event");
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%topic, "await cancelled");
                None
            }
            payload = rx => payload.ok(),
        }
    }
}
