//! Host API for Lua scripts.
//!
//! Provides the `era` global table (I/O and game control) and the `flow`
//! global table (scene transitions). Every function drains the task queue
//! before its body runs, so tasks queued by other threads take effect at a
//! safe point; a failing task is raised into the calling script.

use std::sync::Arc;

use mlua::{
    Error as LuaError, FromLuaMulti, Function, IntoLuaMulti, Lua, Result as LuaResult, Table,
    Value,
};
use rand::Rng;

use super::signal::HostSignal;
use crate::io::SharedIo;
use crate::runtime::TaskQueue;
use crate::scene::SceneLinks;

/// Host API builder for registering functions with Lua.
pub struct HostApi {
    io: SharedIo,
    links: SceneLinks,
    queue: Arc<TaskQueue>,
}

impl HostApi {
    pub fn new(io: SharedIo, links: SceneLinks, queue: Arc<TaskQueue>) -> Self {
        Self { io, links, queue }
    }

    /// Register the `era` and `flow` tables with the Lua environment.
    pub fn register(self, lua: &Lua) -> LuaResult<()> {
        let era = lua.create_table()?;

        // === Output functions ===
        self.register_print_functions(lua, &era)?;

        // === Input functions ===
        self.register_input_functions(lua, &era)?;

        // === Control functions ===
        self.register_control_functions(lua, &era)?;

        lua.globals().set("era", era)?;

        let flow = lua.create_table()?;
        self.register_flow_functions(lua, &flow)?;
        lua.globals().set("flow", flow)?;

        Ok(())
    }

    /// Create a host function that drains the task queue before running.
    fn host_fn<A, R, F>(&self, lua: &Lua, func: F) -> LuaResult<Function>
    where
        A: FromLuaMulti,
        R: IntoLuaMulti,
        F: Fn(&Lua, A) -> LuaResult<R> + 'static,
    {
        let queue = Arc::clone(&self.queue);
        lua.create_function(move |lua, args: A| {
            queue.drain()?;
            func(lua, args)
        })
    }

    /// Register print/println/caution functions.
    fn register_print_functions(&self, lua: &Lua, era: &Table) -> LuaResult<()> {
        // era.print(text) - output without newline
        let io = self.io.clone();
        let print_fn = self.host_fn(lua, move |_, text: Value| {
            io.borrow_mut().print(&value_to_string(&text))?;
            Ok(())
        })?;
        era.set("print", print_fn)?;

        // era.println(text) - output with newline
        let io = self.io.clone();
        let println_fn = self.host_fn(lua, move |_, text: Option<Value>| {
            let text = text.map(|v| value_to_string(&v)).unwrap_or_default();
            io.borrow_mut().print_line(&text)?;
            Ok(())
        })?;
        era.set("println", println_fn)?;

        // era.caution(text) - developer-visible warning
        let io = self.io.clone();
        let caution_fn = self.host_fn(lua, move |_, text: Value| {
            io.borrow_mut().print_caution(&value_to_string(&text))?;
            Ok(())
        })?;
        era.set("caution", caution_fn)?;

        Ok(())
    }

    /// Register blocking input functions. The I/O collaborator keeps the
    /// watchdog paused while these wait.
    fn register_input_functions(&self, lua: &Lua, era: &Table) -> LuaResult<()> {
        // era.input([prompt]) - read a line
        let io = self.io.clone();
        let input_fn = self.host_fn(lua, move |_, prompt: Option<String>| {
            Ok(io.borrow_mut().input_line(prompt.as_deref())?)
        })?;
        era.set("input", input_fn)?;

        // era.input_int([prompt]) - read a line as an integer, nil if it is not one
        let io = self.io.clone();
        let input_int_fn = self.host_fn(lua, move |_, prompt: Option<String>| {
            let line = io.borrow_mut().input_line(prompt.as_deref())?;
            Ok(line.trim().parse::<i64>().ok())
        })?;
        era.set("input_int", input_int_fn)?;

        // era.wait() - wait for the player to continue
        let io = self.io.clone();
        let wait_fn = self.host_fn(lua, move |_, ()| {
            io.borrow_mut().wait()?;
            Ok(())
        })?;
        era.set("wait", wait_fn)?;

        Ok(())
    }

    /// Register random numbers and the functions that raise host signals.
    fn register_control_functions(&self, lua: &Lua, era: &Table) -> LuaResult<()> {
        // era.random(min, max) - generate random number
        let random_fn = self.host_fn(lua, |_, (min, max): (i64, i64)| {
            if min > max {
                return Err(LuaError::RuntimeError(
                    "random: min must be less than or equal to max".to_string(),
                ));
            }
            let mut rng = rand::rng();
            Ok(rng.random_range(min..=max))
        })?;
        era.set("random", random_fn)?;

        // era.quit() - end the game
        let quit_fn = self.host_fn(lua, |_, ()| {
            Err::<(), _>(LuaError::external(HostSignal::Quit))
        })?;
        era.set("quit", quit_fn)?;

        // era.long_return() - unwind to the hook the host called
        let long_return_fn = self.host_fn(lua, |_, ()| {
            Err::<(), _>(LuaError::external(HostSignal::LongReturn))
        })?;
        era.set("long_return", long_return_fn)?;

        Ok(())
    }

    /// Register scene flow functions.
    fn register_flow_functions(&self, lua: &Lua, flow: &Table) -> LuaResult<()> {
        // flow.set_next_scene(name) - preset the target of a forced transition
        let links = self.links.clone();
        let set_next_fn = self.host_fn(lua, move |_, name: String| {
            links.set_next_by_name(&name)?;
            Ok(())
        })?;
        flow.set("set_next_scene", set_next_fn)?;

        // flow.goto_scene(name) - leave the current scene for `name` now
        let links = self.links.clone();
        let goto_fn = self.host_fn(lua, move |_, name: String| {
            links.set_next_by_name(&name)?;
            Err::<(), _>(LuaError::external(HostSignal::SceneNext))
        })?;
        flow.set("goto_scene", goto_fn)?;

        // flow.goto_next_scene() - leave for the preset next scene
        let goto_next_fn = self.host_fn(lua, |_, ()| {
            Err::<(), _>(LuaError::external(HostSignal::SceneNext))
        })?;
        flow.set("goto_next_scene", goto_next_fn)?;

        let links = self.links.clone();
        let has_scene_fn =
            self.host_fn(lua, move |_, name: String| Ok(links.is_registered(&name)))?;
        flow.set("has_scene", has_scene_fn)?;

        let links = self.links.clone();
        let current_fn = self.host_fn(lua, move |_, ()| Ok(links.current()))?;
        flow.set("current_scene", current_fn)?;

        let links = self.links.clone();
        let prev_fn = self.host_fn(lua, move |_, ()| Ok(links.prev()))?;
        flow.set("prev_scene", prev_fn)?;

        let links = self.links.clone();
        let next_fn = self.host_fn(lua, move |_, ()| Ok(links.next()))?;
        flow.set("next_scene", next_fn)?;

        Ok(())
    }
}

/// Convert a Lua Value to a string for output.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy().into(),
        Value::Table(_) => "[table]".to_string(),
        Value::Function(_) => "[function]".to_string(),
        Value::Thread(_) => "[thread]".to_string(),
        Value::UserData(_) => "[userdata]".to_string(),
        Value::LightUserData(_) => "[lightuserdata]".to_string(),
        Value::Error(e) => format!("[error: {}]", e),
        _ => "[unknown]".to_string(),
    }
}
