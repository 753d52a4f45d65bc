//! The node actor.
//!
//! A node is a run loop consuming lifecycle signals plus, while user code
//! runs, one blocking execution task. User code executes off the runtime
//! (`spawn_blocking`); its `send`/`await_n` calls bridge back into async
//! land with `Handle::block_on`, selecting against the execution's
//! cancellation token so a stop or resize always unblocks it.
//!
//! The send and receive endpoints a run uses are snapshotted when it
//! starts; edges added or removed mid-run apply from the next start.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use simnet_bus::{BindingId, BusHandle, Event, Payload, PayloadKind, SendTask, Topic};
use simnet_script::{
    AwaitFn, CallBindings, EngineFactory, ExecContext, ScriptEngine, ScriptError, SendFn,
    DEFAULT_PROGRAM,
};
use simnet_types::NodeId;

use crate::edge::{Inlet, Outlet};
use crate::signal::{Signal, SignalQueue};
use crate::step::StepController;

/// Uncontended-lock helper; a poisoned node state is still usable.
pub(crate) fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Node state shared between the run loop and the orchestrator.
#[derive(Default)]
pub(crate) struct NodeShared {
    /// Opaque per-node value exposed to user code as `ctx.data`.
    pub data: serde_json::Value,
    /// Outgoing edges, in target order. Duplicate edges stack.
    pub outs: BTreeMap<NodeId, Vec<Outlet>>,
    /// Incoming edges, in connect order.
    pub ins: Vec<Inlet>,
}

pub(crate) struct Node {
    pub(crate) id: NodeId,
    pub(crate) shared: Arc<StdMutex<NodeShared>>,
}

impl Node {
    /// Spawns the run loop and the node's `CodeChange` subscription.
    pub(crate) fn spawn(
        id: NodeId,
        bus: &BusHandle,
        signals: SignalQueue,
        step: Arc<StepController>,
        factory: Arc<dyn EngineFactory>,
    ) -> Self {
        let shared = Arc::new(StdMutex::new(NodeShared::default()));
        let code = Arc::new(StdMutex::new(DEFAULT_PROGRAM.to_string()));

        // Replay hands a node created after a CodeChange the latest code.
        let cell = Arc::clone(&code);
        let binding = bus.bind(Topic::CodeChange, PayloadKind::Code, move |payload| {
            if let Payload::Code(source) = payload {
                *lock(&cell) = source.clone();
            }
        });

        tokio::spawn(run(
            id,
            bus.clone(),
            signals,
            step,
            factory,
            Arc::clone(&shared),
            code,
            binding,
        ));
        Self { id, shared }
    }
}

#[derive(Default)]
struct ExecOutcome {
    log: String,
    result: serde_json::Value,
}

struct Running {
    cancel: CancellationToken,
    done: oneshot::Receiver<ExecOutcome>,
}

#[allow(clippy::too_many_arguments)]
async fn run(
    id: NodeId,
    bus: BusHandle,
    signals: SignalQueue,
    step: Arc<StepController>,
    factory: Arc<dyn EngineFactory>,
    shared: Arc<StdMutex<NodeShared>>,
    code: Arc<StdMutex<String>>,
    binding: BindingId,
) {
    let mut running: Option<Running> = None;

    while let Some(signal) = signals.recv().await {
        match signal {
            Signal::Start | Signal::Debug => {
                // Running ends only at Stop, which also harvests the
                // outcome of a run that already returned on its own.
                if running.is_some() {
                    debug!(node = %id, ?signal, "already running");
                    continue;
                }
                let debug_mode = signal == Signal::Debug;
                info!(node = %id, debug = debug_mode, "starting user code");
                running = Some(start_exec(
                    id,
                    &shared,
                    &code,
                    &bus,
                    &step,
                    &factory,
                    debug_mode,
                ));
            }
            Signal::Stop => {
                let Some(active) = running.take() else {
                    debug!(node = %id, "stop while idle");
                    continue;
                };
                active.cancel.cancel();
                let outcome = active.done.await.unwrap_or_default();
                info!(node = %id, "user code stopped");
                bus.publish_awaited(Event::new(
                    Topic::NodeOutput,
                    Payload::NodeOutput {
                        log: outcome.log,
                        result: outcome.result,
                        node: id,
                    },
                ))
                .await;
            }
            Signal::Term => {
                if let Some(active) = running.take() {
                    active.cancel.cancel();
                }
                break;
            }
        }
    }

    bus.unbind(Topic::CodeChange, binding);
    debug!(node = %id, "node task stopped");
}

/// What one execution sees of the network, captured at start.
struct ExecSnapshot {
    data: serde_json::Value,
    out_neighbors: Vec<NodeId>,
    in_neighbors: Vec<NodeId>,
    senders: BTreeMap<NodeId, mpsc::Sender<serde_json::Value>>,
    inlets: Vec<(NodeId, Arc<TokioMutex<mpsc::Receiver<serde_json::Value>>>)>,
}

fn take_snapshot(shared: &StdMutex<NodeShared>) -> ExecSnapshot {
    let state = lock(shared);
    let mut out_neighbors = Vec::new();
    let mut senders = BTreeMap::new();
    for (target, outlets) in &state.outs {
        for _ in outlets {
            out_neighbors.push(*target);
        }
        if let Some(first) = outlets.first() {
            senders.insert(*target, first.tx.clone());
        }
    }
    ExecSnapshot {
        data: state.data.clone(),
        out_neighbors,
        in_neighbors: state.ins.iter().map(|inlet| inlet.from).collect(),
        senders,
        inlets: state
            .ins
            .iter()
            .map(|inlet| (inlet.from, Arc::clone(&inlet.rx)))
            .collect(),
    }
}

fn start_exec(
    id: NodeId,
    shared: &Arc<StdMutex<NodeShared>>,
    code: &Arc<StdMutex<String>>,
    bus: &BusHandle,
    step: &Arc<StepController>,
    factory: &Arc<dyn EngineFactory>,
    debug_mode: bool,
) -> Running {
    let cancel = CancellationToken::new();
    let (done_tx, done) = oneshot::channel();

    let snapshot = take_snapshot(shared);
    let source = lock(code).clone();
    let bus = bus.clone();
    let step = Arc::clone(step);
    let factory = Arc::clone(factory);
    let exec_cancel = cancel.clone();
    let handle = Handle::current();

    task::spawn_blocking(move || {
        // The engine lives and dies on this thread.
        let mut engine = factory.create();
        let outcome = execute(
            engine.as_mut(),
            id,
            &source,
            snapshot,
            &bus,
            &step,
            debug_mode,
            &exec_cancel,
            &handle,
        );
        let _ = done_tx.send(outcome);
    });

    Running { cancel, done }
}

#[allow(clippy::too_many_arguments)]
fn execute(
    engine: &mut dyn ScriptEngine,
    id: NodeId,
    source: &str,
    snapshot: ExecSnapshot,
    bus: &BusHandle,
    step: &Arc<StepController>,
    debug_mode: bool,
    cancel: &CancellationToken,
    handle: &Handle,
) -> ExecOutcome {
    if let Err(err) = engine.compile(source) {
        info!(node = %id, %err, "compile failed");
        let mut log = engine.drain_output();
        if !log.is_empty() {
            log.push('\n');
        }
        log.push_str(&err.to_string());
        return ExecOutcome {
            log,
            result: serde_json::Value::Null,
        };
    }

    let ctx = ExecContext {
        id,
        data: snapshot.data.clone(),
        out_neighbors: snapshot.out_neighbors.clone(),
        in_neighbors: snapshot.in_neighbors.clone(),
    };
    let bindings = CallBindings {
        send: make_send(
            id,
            snapshot.senders,
            bus.clone(),
            Arc::clone(step),
            debug_mode,
            cancel.clone(),
            handle.clone(),
        ),
        await_n: make_await(
            id,
            snapshot.inlets,
            bus.clone(),
            Arc::clone(step),
            debug_mode,
            cancel.clone(),
            handle.clone(),
        ),
    };

    let called = engine.call(&ctx, bindings, cancel);
    let mut log = engine.drain_output();
    match called {
        Ok(result) => ExecOutcome { log, result },
        Err(ScriptError::Cancelled) => {
            debug!(node = %id, "user code cancelled");
            ExecOutcome {
                log,
                result: serde_json::Value::Null,
            }
        }
        Err(err) => {
            info!(node = %id, %err, "user code failed");
            if !log.is_empty() {
                log.push('\n');
            }
            log.push_str(&err.to_string());
            ExecOutcome {
                log,
                result: serde_json::Value::Null,
            }
        }
    }
}

/// Blocking `send` bridge: deliver to the first sender for the target,
/// `0` for unknown peers. In debug mode the pending transfer is published
/// and the node pauses before the message moves.
fn make_send(
    id: NodeId,
    senders: BTreeMap<NodeId, mpsc::Sender<serde_json::Value>>,
    bus: BusHandle,
    step: Arc<StepController>,
    debug_mode: bool,
    cancel: CancellationToken,
    handle: Handle,
) -> SendFn {
    Box::new(move |target, data| {
        let Some(tx) = senders.get(&target) else {
            debug!(node = %id, %target, "send to unconnected peer");
            return 0;
        };
        handle.block_on(async {
            if debug_mode {
                let ticket = step.ticket();
                bus.publish_awaited(Event::new(
                    Topic::SentTo,
                    Payload::Sent(SendTask {
                        from: id,
                        to: target,
                        data: data.clone(),
                    }),
                ))
                .await;
                step.pause(ticket, &cancel).await;
                if cancel.is_cancelled() {
                    return 0;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => 0,
                sent = tx.send(data) => usize::from(sent.is_ok()),
            }
        })
    })
}

/// Blocking `await_n` bridge: fan every incoming edge into one channel
/// and read `cnt` messages, keeping per-message provenance. Cancellation
/// returns whatever arrived so far.
fn make_await(
    id: NodeId,
    inlets: Vec<(NodeId, Arc<TokioMutex<mpsc::Receiver<serde_json::Value>>>)>,
    bus: BusHandle,
    step: Arc<StepController>,
    debug_mode: bool,
    cancel: CancellationToken,
    handle: Handle,
) -> AwaitFn {
    Box::new(move |cnt| {
        handle.block_on(async {
            if debug_mode {
                bus.publish_awaited(Event::new(Topic::AwaitStart, Payload::Node(id)))
                    .await;
            }

            let scope = cancel.child_token();
            // Headroom so forwarders never block on a full channel.
            let (agg_tx, mut agg_rx) = mpsc::channel(cnt + inlets.len() + 1);
            let mut readers = Vec::with_capacity(inlets.len());
            for (from, rx) in &inlets {
                let from = *from;
                let rx = Arc::clone(rx);
                let agg = agg_tx.clone();
                let scope = scope.clone();
                readers.push(tokio::spawn(async move {
                    // Holds the inlet for the whole batch.
                    let mut guard = rx.lock().await;
                    loop {
                        tokio::select! {
                            _ = scope.cancelled() => break,
                            msg = guard.recv() => match msg {
                                Some(data) => {
                                    tokio::select! {
                                        _ = scope.cancelled() => break,
                                        sent = agg.send((from, data)) => {
                                            if sent.is_err() {
                                                break;
                                            }
                                        }
                                    }
                                }
                                None => break,
                            }
                        }
                    }
                }));
            }
            drop(agg_tx);

            let mut transfers = Vec::with_capacity(cnt);
            while transfers.len() < cnt {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = agg_rx.recv() => match msg {
                        Some(pair) => transfers.push(pair),
                        None => {
                            // No inlet can deliver the rest of the batch
                            // (none exist, or their senders are gone). The
                            // batch stays open until the run is cancelled.
                            cancel.cancelled().await;
                            break;
                        }
                    }
                }
            }
            scope.cancel();
            for reader in readers {
                let _ = reader.await;
            }

            if debug_mode {
                let ticket = step.ticket();
                let batch: Vec<SendTask> = transfers
                    .iter()
                    .map(|(from, data)| SendTask {
                        from: *from,
                        to: id,
                        data: data.clone(),
                    })
                    .collect();
                bus.publish_awaited(Event::new(Topic::AwaitEnd, Payload::Batch(batch)))
                    .await;
                step.pause(ticket, &cancel).await;
            }

            transfers
        })
    })
}
