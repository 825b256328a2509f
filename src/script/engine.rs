//! Lua script engine with sandboxing.

use std::path::Path;
use std::sync::Arc;

use mlua::{Function, HookTriggers, Lua, LuaSerdeExt, Thread, Value, VmState};
use tracing::{debug, info};

use super::loader::ScriptLoader;
use super::protect;
use super::signal::{check_special_error, HostSignal};
use crate::config::ScriptConfig;
use crate::runtime::{CancelToken, TaskQueue};
use crate::save::StateStore;
use crate::scene::Scripter;
use crate::{EraError, Result};

/// Global table persisted by saves.
pub const SAVEDATA_GLOBAL: &str = "savedata";

/// Lua script execution engine with sandboxing.
///
/// Every entry point is a top-level script call: it refuses to start once the
/// cancellation context fired, drains the task queue, and classifies host
/// signals raised by the call.
pub struct ScriptEngine {
    lua: Lua,
    cancel: CancelToken,
    queue: Arc<TaskQueue>,
    triggers: HookTriggers,
}

/// Instruction hook raising the cancellation reason once `cancel` fires.
fn interrupt(cancel: CancelToken) -> impl Fn(&Lua, mlua::Debug) -> mlua::Result<VmState> {
    move |_lua, _debug| match cancel.reason() {
        Some(reason) => Err(mlua::Error::external(HostSignal::Cancelled(reason))),
        None => Ok(VmState::Continue),
    }
}

impl ScriptEngine {
    /// Create a new ScriptEngine bound to a cancellation context and task queue.
    pub fn new(config: &ScriptConfig, cancel: CancelToken, queue: Arc<TaskQueue>) -> Result<Self> {
        // Create Lua with safe standard libraries
        let lua = Lua::new();

        // Apply sandbox restrictions
        Self::apply_sandbox(&lua)?;

        // The check runs every `hook_interval` VM instructions, so a script
        // spinning in a tight loop is still stopped.
        let triggers = HookTriggers::new().every_nth_instruction(config.hook_interval.max(1));
        let hook_cancel = cancel.clone();
        let watch = lua
            .create_function(move |_, thread: Thread| {
                thread.set_hook(triggers, interrupt(hook_cancel.clone()));
                Ok(())
            })
            .map_err(|e| EraError::Script(format!("Failed to create hook installer: {}", e)))?;
        protect::install(&lua, watch)
            .map_err(|e| EraError::Script(format!("Failed to harden protected calls: {}", e)))?;

        // Set memory limit if specified
        if config.max_memory_mb > 0 {
            lua.set_memory_limit(config.max_memory_mb * 1024 * 1024)
                .map_err(|e| EraError::Script(format!("Failed to set memory limit: {}", e)))?;
        }

        let engine = Self {
            lua,
            cancel,
            queue,
            triggers,
        };
        engine.install_interrupt();
        Ok(engine)
    }

    /// Apply sandbox restrictions to the Lua environment.
    fn apply_sandbox(lua: &Lua) -> Result<()> {
        let globals = lua.globals();

        // Disable dangerous functions
        for name in [
            "os",
            "io",
            "loadfile",
            "dofile",
            "load",
            "require",
            "package",
            "debug",
            "collectgarbage",
        ] {
            globals
                .set(name, Value::Nil)
                .map_err(|e| EraError::Script(format!("Failed to disable {}: {}", name, e)))?;
        }

        Ok(())
    }

    /// Hook the main thread. Coroutines are hooked as they are resumed.
    fn install_interrupt(&self) {
        self.lua.set_hook(self.triggers, interrupt(self.cancel.clone()));
    }

    /// Run `call` as a top-level script call.
    fn top_level<T>(&self, call: impl FnOnce() -> mlua::Result<T>) -> Result<Option<T>> {
        if let Some(reason) = self.cancel.reason() {
            return Err(EraError::Cancelled(reason));
        }
        self.queue.drain()?;
        // A previous call may have left the hook on an abandoned coroutine.
        self.install_interrupt();
        check_special_error(call())
    }

    /// Execute Lua source code as a named chunk.
    pub fn execute(&self, source: &str, chunk_name: &str) -> Result<()> {
        self.top_level(|| self.lua.load(source).set_name(chunk_name).exec())?;
        Ok(())
    }

    /// Load every enabled script under `dir`, in path order.
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<usize> {
        let loader = ScriptLoader::new(dir);
        let files = loader.scan()?;
        for file in &files {
            debug!("loading script {} ({})", file.rel_path, file.name);
            self.execute(&file.source, &format!("@{}", file.rel_path))?;
        }
        info!(
            "loaded {} script(s) from {}",
            files.len(),
            loader.scripts_dir().display()
        );
        Ok(files.len())
    }

    fn function(&self, name: &str) -> Result<Function> {
        let value: Value = self
            .lua
            .globals()
            .get(name)
            .map_err(|e| EraError::Script(format!("Failed to get global '{}': {}", name, e)))?;
        match value {
            Value::Function(f) => Ok(f),
            Value::Nil => Err(EraError::FunctionNotFound(name.to_string())),
            other => Err(EraError::Script(format!(
                "global '{}' is a {}, not a function",
                name,
                other.type_name()
            ))),
        }
    }

    /// Set a global value in the Lua environment.
    pub fn set_global<V: mlua::IntoLua>(&self, name: &str, value: V) -> Result<()> {
        self.lua
            .globals()
            .set(name, value)
            .map_err(|e| EraError::Script(format!("Failed to set global '{}': {}", name, e)))
    }

    /// Get a global value from the Lua environment.
    pub fn get_global<V: mlua::FromLua>(&self, name: &str) -> Result<V> {
        self.lua
            .globals()
            .get(name)
            .map_err(|e| EraError::Script(format!("Failed to get global '{}': {}", name, e)))
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Get a reference to the underlying Lua instance.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

impl Scripter for ScriptEngine {
    fn call_by_name(&self, name: &str) -> Result<()> {
        let f = self.function(name)?;
        self.top_level(|| f.call::<()>(()))?;
        Ok(())
    }

    fn call_bool_arg_int_by_name(&self, name: &str, arg: i64) -> Result<bool> {
        let f = self.function(name)?;
        let ret = self.top_level(|| f.call::<Value>(arg))?;
        // Lua truthiness; a long return reads as false.
        Ok(matches!(ret, Some(v) if !matches!(v, Value::Nil | Value::Boolean(false))))
    }

    /// Only functions count; a hook set to `false` is undefined.
    fn has_value(&self, name: &str) -> bool {
        matches!(self.lua.globals().get::<Value>(name), Ok(Value::Function(_)))
    }
}

impl StateStore for ScriptEngine {
    fn snapshot(&self) -> Result<serde_json::Value> {
        let value: Value = self.get_global(SAVEDATA_GLOBAL)?;
        if value.is_nil() {
            return Ok(serde_json::Value::Null);
        }
        self.lua
            .from_value(value)
            .map_err(|e| EraError::Save(format!("Failed to serialize {}: {}", SAVEDATA_GLOBAL, e)))
    }

    fn restore(&self, data: &serde_json::Value) -> Result<()> {
        if data.is_null() {
            return self.set_global(SAVEDATA_GLOBAL, Value::Nil);
        }
        let value = self
            .lua
            .to_value(data)
            .map_err(|e| EraError::Save(format!("Failed to restore {}: {}", SAVEDATA_GLOBAL, e)))?;
        self.set_global(SAVEDATA_GLOBAL, value)
    }
}
