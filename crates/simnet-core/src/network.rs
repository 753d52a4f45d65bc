//! The network orchestrator.
//!
//! One task owns the node set. Control topics on the bus forward into
//! its command channel, so a lifecycle broadcast can never interleave
//! with a resize. `ContinueNodes` is the one exception: it releases the
//! step controller straight from the bus callback, so paused nodes wake
//! even while the orchestrator is busy.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use simnet_bus::{BusHandle, Edge, Event, Payload, PayloadKind, Topic};
use simnet_script::EngineFactory;
use simnet_types::NodeId;

use crate::config::NetworkConfig;
use crate::edge::link;
use crate::error::NetError;
use crate::node::{lock, Node};
use crate::signal::{Signal, SignalQueue};
use crate::step::StepController;

enum NetCommand {
    Connect(Edge),
    Disconnect(Edge),
    SetData {
        target: NodeId,
        data: serde_json::Value,
    },
    Resize(usize),
    Broadcast(Signal),
}

/// A running network, fully driven over the bus after spawn.
pub struct NetworkHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    step: Arc<StepController>,
}

impl NetworkHandle {
    /// Binds the control topics, spawns the initial nodes, and announces
    /// them with a `NetworkResize` event.
    pub async fn spawn(
        bus: BusHandle,
        factory: Arc<dyn EngineFactory>,
        config: NetworkConfig,
    ) -> Self {
        let step = Arc::new(StepController::new());
        let (tx, rx) = mpsc::unbounded_channel();

        bind_controls(&bus, &tx, &step).await;

        let mut network = Network {
            bus: bus.clone(),
            factory,
            step: Arc::clone(&step),
            signals: SignalQueue::new(config.signal_capacity),
            nodes: Vec::new(),
            config,
        };
        network.nodes = network.spawn_nodes(network.config.initial_nodes);
        info!(count = network.nodes.len(), "network up");
        bus.publish_awaited(Event::new(
            Topic::NetworkResize,
            Payload::Resize {
                edges: Vec::new(),
                count: network.nodes.len(),
            },
        ))
        .await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(network.run(rx, cancel.clone()));
        Self { cancel, task, step }
    }

    /// Nodes currently paused by the single-step protocol.
    #[must_use]
    pub fn paused_nodes(&self) -> usize {
        self.step.paused()
    }

    /// Terminates every node and stops the orchestrator.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

async fn bind_controls(
    bus: &BusHandle,
    tx: &mpsc::UnboundedSender<NetCommand>,
    step: &Arc<StepController>,
) {
    let forward = |topic: Topic,
                   kind: PayloadKind,
                   map: fn(&Payload) -> Option<NetCommand>| {
        let tx = tx.clone();
        let bus = bus.clone();
        async move {
            let bound = bus
                .bind_awaited(topic, kind, move |payload| {
                    if let Some(cmd) = map(payload) {
                        let _ = tx.send(cmd);
                    }
                })
                .await;
            if bound.is_none() {
                warn!(%topic, "control topic bind failed");
            }
        }
    };

    forward(Topic::ConnectNodes, PayloadKind::Edge, |p| match p {
        Payload::Edge(edge) => Some(NetCommand::Connect(*edge)),
        _ => None,
    })
    .await;
    forward(Topic::DisconnectNodes, PayloadKind::Edge, |p| match p {
        Payload::Edge(edge) => Some(NetCommand::Disconnect(*edge)),
        _ => None,
    })
    .await;
    forward(Topic::NodeDataChange, PayloadKind::NodeData, |p| match p {
        Payload::NodeData { target, data } => Some(NetCommand::SetData {
            target: *target,
            data: data.clone(),
        }),
        _ => None,
    })
    .await;
    forward(Topic::NodeCntChange, PayloadKind::Count, |p| match p {
        Payload::Count(count) => Some(NetCommand::Resize(*count)),
        _ => None,
    })
    .await;
    forward(Topic::StartNodes, PayloadKind::Empty, |_| {
        Some(NetCommand::Broadcast(Signal::Start))
    })
    .await;
    forward(Topic::StopNodes, PayloadKind::Empty, |_| {
        Some(NetCommand::Broadcast(Signal::Stop))
    })
    .await;
    forward(Topic::DebugNodes, PayloadKind::Empty, |_| {
        Some(NetCommand::Broadcast(Signal::Debug))
    })
    .await;

    let release = Arc::clone(step);
    if bus
        .bind_awaited(Topic::ContinueNodes, PayloadKind::Empty, move |_| {
            release.release();
        })
        .await
        .is_none()
    {
        warn!(topic = %Topic::ContinueNodes, "control topic bind failed");
    }
}

struct Network {
    bus: BusHandle,
    factory: Arc<dyn EngineFactory>,
    step: Arc<StepController>,
    signals: SignalQueue,
    nodes: Vec<Node>,
    config: NetworkConfig,
}

impl Network {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<NetCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                }
            }
        }
        self.signals
            .broadcast(Signal::Term, self.nodes.len())
            .await;
        debug!("network task stopped");
    }

    async fn handle(&mut self, cmd: NetCommand) {
        match cmd {
            NetCommand::Connect(edge) => {
                if self.connect(edge) {
                    self.publish_connections().await;
                }
            }
            NetCommand::Disconnect(edge) => {
                if self.disconnect(edge) {
                    self.publish_connections().await;
                }
            }
            NetCommand::SetData { target, data } => self.set_data(target, data),
            NetCommand::Resize(count) => self.resize(count).await,
            NetCommand::Broadcast(signal) => {
                self.signals.broadcast(signal, self.nodes.len()).await;
            }
        }
    }

    fn spawn_nodes(&self, count: usize) -> Vec<Node> {
        (0..count)
            .map(|i| {
                Node::spawn(
                    NodeId::new(i),
                    &self.bus,
                    self.signals.clone(),
                    Arc::clone(&self.step),
                    Arc::clone(&self.factory),
                )
            })
            .collect()
    }

    fn connect(&mut self, edge: Edge) -> bool {
        let count = self.nodes.len();
        if edge.from.index() >= count || edge.to.index() >= count {
            warn!(%edge, error = %NetError::InvalidEdge { edge, count }, "connect ignored");
            return false;
        }
        let (outlet, inlet) = link(edge.from, edge.to, self.config.edge_capacity);
        lock(&self.nodes[edge.from.index()].shared)
            .outs
            .entry(edge.to)
            .or_default()
            .push(outlet);
        lock(&self.nodes[edge.to.index()].shared).ins.push(inlet);
        debug!(%edge, "connected");
        true
    }

    fn disconnect(&mut self, edge: Edge) -> bool {
        let count = self.nodes.len();
        if edge.from.index() >= count || edge.to.index() >= count {
            warn!(%edge, error = %NetError::InvalidEdge { edge, count }, "disconnect ignored");
            return false;
        }
        let removed = {
            let mut state = lock(&self.nodes[edge.from.index()].shared);
            match state.outs.get_mut(&edge.to) {
                Some(outlets) if !outlets.is_empty() => {
                    outlets.pop();
                    if outlets.is_empty() {
                        state.outs.remove(&edge.to);
                    }
                    true
                }
                _ => false,
            }
        };
        if !removed {
            warn!(%edge, error = %NetError::UnknownEdge { edge }, "disconnect ignored");
            return false;
        }
        let mut state = lock(&self.nodes[edge.to.index()].shared);
        if let Some(pos) = state.ins.iter().rposition(|inlet| inlet.from == edge.from) {
            state.ins.remove(pos);
        }
        debug!(%edge, "disconnected");
        true
    }

    fn set_data(&mut self, target: NodeId, data: serde_json::Value) {
        let count = self.nodes.len();
        let Some(node) = self.nodes.get(target.index()) else {
            warn!(%target, error = %NetError::InvalidNode { node: target, count }, "set data ignored");
            return;
        };
        debug!(%target, "node data changed");
        lock(&node.shared).data = data;
    }

    /// Terminate everything, rebuild at the new count, replay the edges
    /// whose endpoints survive. Unfinished execution output is discarded.
    async fn resize(&mut self, count: usize) {
        let snapshot = self.edges();
        self.signals
            .broadcast(Signal::Term, self.nodes.len())
            .await;

        // Fresh queue per generation: old Term signals stay with the old
        // nodes.
        self.signals = SignalQueue::new(self.config.signal_capacity);
        self.nodes = self.spawn_nodes(count);

        let surviving: Vec<Edge> = snapshot
            .into_iter()
            .filter(|edge| edge.from.index() < count && edge.to.index() < count)
            .collect();
        for edge in &surviving {
            self.connect(*edge);
        }
        info!(count, edges = surviving.len(), "network resized");
        self.bus
            .publish_awaited(Event::new(
                Topic::NetworkResize,
                Payload::Resize {
                    edges: surviving,
                    count,
                },
            ))
            .await;
    }

    fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for node in &self.nodes {
            let state = lock(&node.shared);
            for (to, outlets) in &state.outs {
                for _ in outlets {
                    edges.push(Edge {
                        from: node.id,
                        to: *to,
                    });
                }
            }
        }
        edges
    }

    async fn publish_connections(&self) {
        self.bus
            .publish_awaited(Event::new(
                Topic::NetworkConnections,
                Payload::Edges(self.edges()),
            ))
            .await;
    }
}
