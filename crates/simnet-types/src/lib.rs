//! Shared types for the simnet emulator.
//!
//! This crate is the bottom of the dependency stack. It holds the
//! identifier types every other simnet crate speaks in, plus the
//! [`ErrorCode`] trait that gives all simnet errors a machine-readable
//! code and recoverability flag.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  simnet-core   : Node, Network, Signals      │
//! │  simnet-script : ScriptEngine, LuaEngine     │
//! │  simnet-bus    : Topic, Payload, EventBus    │
//! ├──────────────────────────────────────────────┤
//! │  simnet-types  : NodeId, ErrorCode  ◄── HERE │
//! └──────────────────────────────────────────────┘
//! ```

mod error;
mod id;

pub use error::{assert_error_codes, ErrorCode};
pub use id::NodeId;
