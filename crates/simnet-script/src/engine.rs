//! The engine capability trait and the values passed across it.

use simnet_types::NodeId;
use tokio_util::sync::CancellationToken;

use crate::ScriptError;

/// Read-only context values exposed to a program.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// The executing node's own id.
    pub id: NodeId,
    /// The node's opaque payload value.
    pub data: serde_json::Value,
    /// Peer ids the node has outgoing edges to, one entry per edge.
    pub out_neighbors: Vec<NodeId>,
    /// Peer ids the node has incoming edges from, one entry per edge.
    pub in_neighbors: Vec<NodeId>,
}

/// Host bridge for the program's `send(target, data)` callable.
///
/// Returns the delivery count: 1 when an edge to `target` accepted the
/// message, 0 when no such edge exists.
pub type SendFn = Box<dyn Fn(NodeId, serde_json::Value) -> usize + Send>;

/// Host bridge for the program's `await_n(cnt)` callable.
///
/// Returns up to `cnt` received messages as `(sender, data)` pairs; fewer
/// only when the run was cancelled mid-collection.
pub type AwaitFn = Box<dyn Fn(usize) -> Vec<(NodeId, serde_json::Value)> + Send>;

/// The messaging bridges handed to one call.
pub struct CallBindings {
    /// See [`SendFn`].
    pub send: SendFn,
    /// See [`AwaitFn`].
    pub await_n: AwaitFn,
}

/// A swappable script execution engine.
///
/// Engines are created per execution (via [`EngineFactory`]) on the
/// thread that runs them, so implementations need not be `Send`.
pub trait ScriptEngine {
    /// Compiles `source` and resolves its entry point.
    fn compile(&mut self, source: &str) -> Result<(), ScriptError>;

    /// Invokes the compiled entry point with the context values and
    /// messaging bridges. Blocks until the program returns, `cancel`
    /// fires, or the program faults. A run whose token fired reports
    /// [`ScriptError::Cancelled`] even if the program still returned.
    fn call(
        &mut self,
        ctx: &ExecContext,
        bindings: CallBindings,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ScriptError>;

    /// Drains everything the program printed since the last drain.
    fn drain_output(&mut self) -> String;
}

/// Creates engines on demand.
///
/// The factory crosses threads (the node spawns each execution on a
/// blocking thread); the engines it creates do not.
pub trait EngineFactory: Send + Sync {
    /// Creates a fresh engine for one execution.
    fn create(&self) -> Box<dyn ScriptEngine>;
}
