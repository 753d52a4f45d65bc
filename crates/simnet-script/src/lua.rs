//! Sandboxed Lua implementation of [`ScriptEngine`].
//!
//! # Security model
//!
//! Programs run against a whitelist-only environment table: core language
//! functions plus `math`/`string`/`table`. `os`, `io`, `debug`,
//! `require`, `load`, `loadfile` and `dofile` are simply absent.
//!
//! # Cancellation
//!
//! An instruction-count hook polls the [`CancellationToken`] and raises a
//! Lua runtime error once it fires, so even a busy loop unwinds within a
//! bounded number of instructions. The host-side `send`/`await_n`
//! bridges select on the same token, so a program blocked in Rust
//! unblocks promptly too.

use std::sync::{Arc, Mutex};

use mlua::{HookTriggers, Lua, Table, Value, VmState};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    json_to_lua, lua_to_json, CallBindings, EngineFactory, ExecContext, ScriptEngine, ScriptError,
};
use simnet_types::NodeId;

/// Fixed entry point name a program must define.
const ENTRY_POINT: &str = "run";

/// Instructions between cancellation polls.
const CANCEL_POLL_INSTRUCTIONS: u32 = 8_192;

/// Maximum captured output bytes per execution.
const MAX_OUTPUT_BYTES: usize = 32_768;

/// Marker message raised by the hook; recognized when unwinding.
const CANCELLED_MSG: &str = "execution cancelled";

#[derive(Default)]
struct OutputBuf {
    lines: Vec<String>,
    bytes: usize,
}

/// Sandboxed Lua engine.
pub struct LuaEngine {
    lua: Lua,
    entry: Option<mlua::Function>,
    output: Arc<Mutex<OutputBuf>>,
}

impl LuaEngine {
    /// Creates an engine with an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lua: Lua::new(),
            entry: None,
            output: Arc::new(Mutex::new(OutputBuf::default())),
        }
    }

    /// Builds the whitelist-only environment table.
    fn build_env(&self) -> mlua::Result<Table> {
        let lua = &self.lua;
        let env = lua.create_table()?;

        // Captured print: writes to the execution log, not stdout.
        let buf = Arc::clone(&self.output);
        let print_fn = lua.create_function(move |_, args: mlua::MultiValue| {
            let parts: Vec<String> = args.iter().map(display_value).collect();
            let line = parts.join("\t");
            if let Ok(mut out) = buf.lock() {
                out.bytes += line.len() + 1;
                if out.bytes <= MAX_OUTPUT_BYTES {
                    out.lines.push(line);
                }
            }
            Ok(())
        })?;
        env.set("print", print_fn)?;

        let globals = lua.globals();
        for name in &[
            "tostring",
            "tonumber",
            "type",
            "pairs",
            "ipairs",
            "next",
            "select",
            "error",
            "pcall",
            "xpcall",
            "assert",
            "rawget",
            "rawset",
            "rawlen",
            "rawequal",
            "setmetatable",
            "getmetatable",
        ] {
            if let Ok(val) = globals.get::<Value>(*name) {
                if !matches!(val, Value::Nil) {
                    env.set(*name, val)?;
                }
            }
        }

        for lib in &["math", "string", "table"] {
            if let Ok(val) = globals.get::<Value>(*lib) {
                if !matches!(val, Value::Nil) {
                    env.set(*lib, val)?;
                }
            }
        }

        Ok(env)
    }

    fn build_ctx_table(&self, ctx: &ExecContext, cancel: &CancellationToken) -> mlua::Result<Table> {
        let lua = &self.lua;
        let table = lua.create_table()?;
        table.set("id", ctx.id.index())?;
        table.set("data", json_to_lua(&ctx.data, lua)?)?;
        table.set("out_neighbors", neighbor_list(lua, &ctx.out_neighbors)?)?;
        table.set("in_neighbors", neighbor_list(lua, &ctx.in_neighbors)?)?;

        let token = cancel.clone();
        let cancelled_fn = lua.create_function(move |_, ()| Ok(token.is_cancelled()))?;
        table.set("cancelled", cancelled_fn)?;
        Ok(table)
    }
}

impl Default for LuaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for LuaEngine {
    fn compile(&mut self, source: &str) -> Result<(), ScriptError> {
        self.entry = None;
        let env = self
            .build_env()
            .map_err(|e| ScriptError::Compile(format_lua_error(&e)))?;

        self.lua
            .load(source)
            .set_name("=node")
            .set_environment(env.clone())
            .exec()
            .map_err(|e| ScriptError::Compile(format_lua_error(&e)))?;

        let entry: Value = env
            .get(ENTRY_POINT)
            .map_err(|e| ScriptError::Compile(format_lua_error(&e)))?;
        let Value::Function(entry) = entry else {
            return Err(ScriptError::MissingEntryPoint(ENTRY_POINT.into()));
        };

        self.entry = Some(entry);
        Ok(())
    }

    fn call(
        &mut self,
        ctx: &ExecContext,
        bindings: CallBindings,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, ScriptError> {
        let entry = self.entry.clone().ok_or(ScriptError::NotCompiled)?;

        let ctx_table = self
            .build_ctx_table(ctx, cancel)
            .map_err(|e| ScriptError::Runtime(format_lua_error(&e)))?;

        let CallBindings { send, await_n } = bindings;
        let send_fn = self
            .lua
            .create_function(move |_, (target, data): (usize, Value)| {
                let json = lua_to_json(&data)?;
                Ok(send(NodeId::new(target), json))
            })
            .map_err(|e| ScriptError::Runtime(format_lua_error(&e)))?;

        let own = ctx.id;
        let await_fn = self
            .lua
            .create_function(move |lua, cnt: usize| {
                let received = await_n(cnt);
                let arr = lua.create_table()?;
                for (i, (from, data)) in received.into_iter().enumerate() {
                    let entry = lua.create_table()?;
                    entry.set("from", from.index())?;
                    entry.set("to", own.index())?;
                    entry.set("data", json_to_lua(&data, lua)?)?;
                    arr.raw_set(i + 1, entry)?;
                }
                Ok(arr)
            })
            .map_err(|e| ScriptError::Runtime(format_lua_error(&e)))?;

        let token = cancel.clone();
        self.lua.set_hook(
            HookTriggers::new().every_nth_instruction(CANCEL_POLL_INSTRUCTIONS),
            move |_lua, _debug| {
                if token.is_cancelled() {
                    Err(mlua::Error::RuntimeError(CANCELLED_MSG.into()))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );

        debug!(node = %ctx.id, "invoking entry point");
        let outcome = entry.call::<Value>((ctx_table, send_fn, await_fn));
        self.lua.remove_hook();

        match outcome {
            // A cancelled run never yields a result, even when the program
            // slips past the hook and returns after a bridge unblocked.
            Ok(_) if cancel.is_cancelled() => Err(ScriptError::Cancelled),
            Ok(value) => {
                lua_to_json(&value).map_err(|e| ScriptError::Runtime(format_lua_error(&e)))
            }
            Err(e) => {
                let msg = format_lua_error(&e);
                if cancel.is_cancelled() || msg.contains(CANCELLED_MSG) {
                    Err(ScriptError::Cancelled)
                } else {
                    Err(ScriptError::Runtime(msg))
                }
            }
        }
    }

    fn drain_output(&mut self) -> String {
        let mut out = match self.output.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        out.bytes = 0;
        out.lines.drain(..).collect::<Vec<_>>().join("\n")
    }
}

/// Factory for [`LuaEngine`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuaEngineFactory;

impl EngineFactory for LuaEngineFactory {
    fn create(&self) -> Box<dyn ScriptEngine> {
        Box::new(LuaEngine::new())
    }
}

fn neighbor_list(lua: &Lua, peers: &[NodeId]) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (i, peer) in peers.iter().enumerate() {
        table.raw_set(i + 1, peer.index())?;
    }
    Ok(table)
}

/// Display form for `print` arguments.
fn display_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => format!("{n}"),
        Value::String(s) => s
            .to_str()
            .map_or_else(|_| "<invalid utf8>".into(), |s| s.to_string()),
        Value::Table(_) => format!("table: {:p}", value.to_pointer()),
        Value::Function(_) => format!("function: {:p}", value.to_pointer()),
        _ => format!("{value:?}"),
    }
}

/// User-facing form of an mlua error.
fn format_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        _ => format!("{err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: usize) -> ExecContext {
        ExecContext {
            id: NodeId::new(id),
            data: serde_json::Value::Null,
            out_neighbors: vec![],
            in_neighbors: vec![],
        }
    }

    fn noop_bindings() -> CallBindings {
        CallBindings {
            send: Box::new(|_, _| 0),
            await_n: Box::new(|_| vec![]),
        }
    }

    #[test]
    fn compile_error_reported() {
        let mut engine = LuaEngine::new();
        let err = engine.compile("if then end").expect_err("should not compile");
        assert!(matches!(err, ScriptError::Compile(_)), "got: {err:?}");
    }

    #[test]
    fn missing_entry_point_reported() {
        let mut engine = LuaEngine::new();
        let err = engine
            .compile("local x = 1")
            .expect_err("no run function defined");
        assert_eq!(err, ScriptError::MissingEntryPoint("run".into()));
    }

    #[test]
    fn call_before_compile_fails() {
        let mut engine = LuaEngine::new();
        let err = engine
            .call(&ctx(0), noop_bindings(), &CancellationToken::new())
            .expect_err("nothing compiled");
        assert_eq!(err, ScriptError::NotCompiled);
    }

    #[test]
    fn print_is_captured_and_drained() {
        let mut engine = LuaEngine::new();
        engine
            .compile(r#"function run(ctx, send, await_n) print("a", 1) print("b") return 7 end"#)
            .expect("compile");
        let result = engine
            .call(&ctx(0), noop_bindings(), &CancellationToken::new())
            .expect("call");
        assert_eq!(result, serde_json::json!(7));
        assert_eq!(engine.drain_output(), "a\t1\nb");
        // Drained: a second drain is empty.
        assert_eq!(engine.drain_output(), "");
    }

    #[test]
    fn context_values_visible() {
        let mut engine = LuaEngine::new();
        engine
            .compile(
                r#"
                function run(ctx, send, await_n)
                    return {
                        id = ctx.id,
                        data = ctx.data.key,
                        outs = ctx.out_neighbors,
                        ins = ctx.in_neighbors,
                        cancelled = ctx.cancelled(),
                    }
                end
                "#,
            )
            .expect("compile");
        let context = ExecContext {
            id: NodeId::new(2),
            data: serde_json::json!({"key": "value"}),
            out_neighbors: vec![NodeId::new(0), NodeId::new(1)],
            in_neighbors: vec![NodeId::new(3)],
        };
        let result = engine
            .call(&context, noop_bindings(), &CancellationToken::new())
            .expect("call");
        assert_eq!(
            result,
            serde_json::json!({
                "id": 2,
                "data": "value",
                "outs": [0, 1],
                "ins": [3],
                "cancelled": false,
            })
        );
    }

    #[test]
    fn send_bridge_invoked_with_converted_data() {
        use std::sync::Mutex;
        let sent: Arc<Mutex<Vec<(NodeId, serde_json::Value)>>> = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&sent);

        let mut engine = LuaEngine::new();
        engine
            .compile(
                r#"
                function run(ctx, send, await_n)
                    return send(1, {x = 2}) + send(9, "missed")
                end
                "#,
            )
            .expect("compile");
        let bindings = CallBindings {
            send: Box::new(move |target, data| {
                if target == NodeId::new(1) {
                    inner.lock().expect("lock").push((target, data));
                    1
                } else {
                    0
                }
            }),
            await_n: Box::new(|_| vec![]),
        };
        let result = engine
            .call(&ctx(0), bindings, &CancellationToken::new())
            .expect("call");
        assert_eq!(result, serde_json::json!(1));
        assert_eq!(
            *sent.lock().expect("lock"),
            vec![(NodeId::new(1), serde_json::json!({"x": 2}))]
        );
    }

    #[test]
    fn await_bridge_returns_provenance() {
        let mut engine = LuaEngine::new();
        engine
            .compile(
                r#"
                function run(ctx, send, await_n)
                    local got = await_n(2)
                    return {got[1].from, got[1].to, got[1].data, got[2].data}
                end
                "#,
            )
            .expect("compile");
        let bindings = CallBindings {
            send: Box::new(|_, _| 0),
            await_n: Box::new(|cnt| {
                assert_eq!(cnt, 2);
                vec![
                    (NodeId::new(3), serde_json::json!("first")),
                    (NodeId::new(4), serde_json::json!("second")),
                ]
            }),
        };
        let result = engine
            .call(&ctx(1), bindings, &CancellationToken::new())
            .expect("call");
        assert_eq!(result, serde_json::json!([3, 1, "first", "second"]));
    }

    #[test]
    fn busy_loop_unwinds_on_cancellation() {
        let mut engine = LuaEngine::new();
        engine
            .compile("function run(ctx, send, await_n) while true do end end")
            .expect("compile");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .call(&ctx(0), noop_bindings(), &cancel)
            .expect_err("cancelled run must not return");
        assert_eq!(err, ScriptError::Cancelled);
    }

    #[test]
    fn cancellation_during_a_bridge_discards_the_result() {
        let mut engine = LuaEngine::new();
        engine
            .compile(
                r#"
                function run(ctx, send, await_n)
                    await_n(1)
                    return "done"
                end
                "#,
            )
            .expect("compile");
        let cancel = CancellationToken::new();
        let bindings = CallBindings {
            send: Box::new(|_, _| 0),
            await_n: Box::new({
                let cancel = cancel.clone();
                move |_| {
                    cancel.cancel();
                    vec![]
                }
            }),
        };
        let err = engine
            .call(&ctx(0), bindings, &cancel)
            .expect_err("cancelled run must not yield a result");
        assert_eq!(err, ScriptError::Cancelled);
    }

    #[test]
    fn runtime_error_reported_with_output() {
        let mut engine = LuaEngine::new();
        engine
            .compile(r#"function run(ctx, send, await_n) print("before") error("boom") end"#)
            .expect("compile");
        let err = engine
            .call(&ctx(0), noop_bindings(), &CancellationToken::new())
            .expect_err("program errors");
        assert!(matches!(&err, ScriptError::Runtime(msg) if msg.contains("boom")), "got: {err:?}");
        assert_eq!(engine.drain_output(), "before");
    }

    #[test]
    fn sandbox_blocks_os_and_io() {
        for source in [
            "function run(ctx, send, await_n) return os.time() end",
            r#"function run(ctx, send, await_n) return io.open("/etc/passwd") end"#,
            r#"function run(ctx, send, await_n) return require("os") end"#,
        ] {
            let mut engine = LuaEngine::new();
            engine.compile(source).expect("compile");
            let err = engine
                .call(&ctx(0), noop_bindings(), &CancellationToken::new())
                .expect_err("sandboxed global must be absent");
            assert!(matches!(err, ScriptError::Runtime(_)), "got: {err:?}");
        }
    }

    #[test]
    fn default_program_runs_without_neighbors() {
        let mut engine = LuaEngine::new();
        engine.compile(crate::DEFAULT_PROGRAM).expect("compile");
        let result = engine
            .call(&ctx(0), noop_bindings(), &CancellationToken::new())
            .expect("call");
        assert_eq!(result, serde_json::json!(0));
        assert!(engine.drain_output().contains("id\t0"));
    }
}
