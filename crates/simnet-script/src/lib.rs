//! Script adapter for simnet.
//!
//! Nodes run user-supplied programs. This crate hides the concrete
//! execution engine behind the [`ScriptEngine`] capability trait
//! (compile → call, with cooperative cancellation and a captured output
//! log) so the node state machine never touches an interpreter directly.
//!
//! The shipped implementation is [`LuaEngine`]: a sandboxed Lua VM with a
//! whitelist-only environment, captured `print`, and an instruction-count
//! hook that polls the cancellation token.
//!
//! # Calling convention
//!
//! A program must define a global function:
//!
//! ```lua
//! function run(ctx, send, await_n)
//!     -- ctx.id, ctx.data, ctx.out_neighbors, ctx.in_neighbors,
//!     -- ctx.cancelled()
//!     send(1, "hello")        -- returns the delivery count (0 or 1)
//!     local got = await_n(1)  -- array of {from, to, data}
//!     return got[1].data
//! end
//! ```
//!
//! `run`'s return value and everything `print`ed during the call become
//! the node's result and execution log. Compile and resolve failures are
//! captured the same way, never propagated as process faults.

mod convert;
mod embedded;
mod engine;
mod error;
mod lua;

pub use convert::{json_to_lua, lua_to_json};
pub use embedded::DEFAULT_PROGRAM;
pub use engine::{AwaitFn, CallBindings, EngineFactory, ExecContext, ScriptEngine, SendFn};
pub use error::ScriptError;
pub use lua::{LuaEngine, LuaEngineFactory};
