//! Node actors and network orchestration.
//!
//! A network is a set of node tasks joined by directed, bounded message
//! channels. Every node runs the same user program; programs exchange
//! messages over the edges with blocking `send`/`await_n` semantics.
//!
//! Control flows in over the event bus (connect, disconnect, set data,
//! code change, resize, start/stop/debug/continue), results flow back out
//! (connections, resize, node output, and the single-step debug events).
//! [`NetworkHandle::spawn`] wires the whole thing to a
//! [`BusHandle`](simnet_bus::BusHandle) and an engine factory; after that
//! the bus is the only interface.
//!
//! Lifecycle is signal-driven: the orchestrator broadcasts one
//! [`Signal`] per node and each node run loop consumes exactly one copy.
//! A resize terminates every node and rebuilds the network, replaying
//! the edges whose endpoints still exist.

mod config;
mod edge;
mod error;
mod network;
mod node;
mod signal;
mod step;

pub use config::NetworkConfig;
pub use edge::{link, Inlet, Outlet, EDGE_CAPACITY};
pub use error::NetError;
pub use network::NetworkHandle;
pub use signal::{Signal, SignalQueue};
pub use step::{StepController, StepTicket};
