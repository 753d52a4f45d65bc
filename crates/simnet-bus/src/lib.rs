//! Event bus for the simnet emulator.
//!
//! The bus is the sole coordination fabric between the actor engine and
//! any observer (UI, tooling, tests). All parties exchange [`Event`]s on
//! named [`Topic`]s; payloads are a closed tagged union ([`Payload`])
//! whose shape per topic is fixed by the first bind or publish.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   commands    ┌─────────────────────────┐
//! │ BusHandle│ ─────────────►│  bus task (owns state)  │
//! │ (Clone)  │               │  topic → {contract,     │
//! └──────────┘               │   callbacks, recent,    │
//!      ▲                     │   one-shot waiters}     │
//!      │ reentrant ops       └─────────────────────────┘
//!      └── callbacks run inside the bus task and may
//!          bind/publish/unbind through a cloned handle
//! ```
//!
//! A single task owns the whole subscription table and serializes every
//! bind/publish/unbind through an internal command queue. That makes
//! per-topic callback order trivially correct, and because reentrant
//! operations only enqueue a command, a callback can publish from within
//! a publish without deadlocking.
//!
//! # Guarantees
//!
//! - Once a topic has seen its first bind or publish, its payload shape
//!   is fixed; a conflicting bind/publish fails (logged, returns false),
//!   it never panics.
//! - A publish records the event as the topic's most recent,
//!   unconditionally; a later bind replays it exactly once.
//! - Callbacks for one publish run in registration order. Ordering across
//!   different topics is not specified.

mod bus;
mod error;
mod payload;
mod topic;

pub use bus::{BindingId, BusHandle, Callback, EventBus};
pub use error::BusError;
pub use payload::{Edge, Event, Payload, PayloadKind, SendTask};
pub use topic::Topic;
