//! Protected-call hardening.
//!
//! Lua's `pcall`, `xpcall` and `coroutine.resume` would let a user script
//! catch and discard a host signal, e.g. a quit requested from inside a
//! `pcall` block. They are replaced with wrappers that re-raise host signals
//! after the protected call fails, so the signal keeps unwinding to the
//! top-level call boundary.
//!
//! Coroutines are switched too: the instruction hook only fires on one Lua
//! thread at a time, so `coroutine.resume` moves it to the resumed thread and
//! back to the caller afterwards. `coroutine.wrap` is rebuilt on top of that.

use mlua::{Function, Lua, Result as LuaResult, Value};

use super::signal::{classify, HostSignal};

/// Wrapper source. The chunk receives the signal predicate and the hook
/// installer as arguments and captures the original primitives as upvalues
/// before replacing them.
const PRELUDE: &str = r#"
local is_signal, watch = ...
local raw_pcall, raw_xpcall, raw_error = pcall, xpcall, error
local raw_create, raw_resume, raw_running = coroutine.create, coroutine.resume, coroutine.running
local raw_type = type

local function rethrow(ok, ...)
    if not ok and is_signal((...)) then
        raw_error((...), 0)
    end
    return ok, ...
end

pcall = function(f, ...)
    return rethrow(raw_pcall(f, ...))
end

xpcall = function(f, handler, ...)
    local function guarded(err)
        if is_signal(err) then
            return err
        end
        local _, result = raw_pcall(handler, err)
        return result
    end
    return rethrow(raw_xpcall(f, guarded, ...))
end

local function resumed(caller, ok, ...)
    watch(caller)
    return rethrow(ok, ...)
end

coroutine.resume = function(co, ...)
    local caller = raw_running()
    if raw_type(co) == "thread" then
        watch(co)
    end
    return resumed(caller, raw_resume(co, ...))
end

local resume = coroutine.resume

local function unwrap(ok, ...)
    if not ok then
        raw_error((...), 0)
    end
    return ...
end

coroutine.wrap = function(f)
    local co = raw_create(f)
    return function(...)
        return unwrap(resume(co, ...))
    end
end
"#;

/// Whether a Lua error value carries a host signal.
fn is_host_signal(value: &Value) -> bool {
    match value {
        Value::Error(err) => classify(err).is_some(),
        Value::String(s) => HostSignal::from_message(&s.to_string_lossy()).is_some(),
        _ => false,
    }
}

/// Replace the protected-call primitives of `lua`.
///
/// `watch` receives a Lua thread and must install the instruction hook on it.
/// Must run before any user script is loaded.
pub fn install(lua: &Lua, watch: Function) -> LuaResult<()> {
    let is_signal = lua.create_function(|_, value: Value| Ok(is_host_signal(&value)))?;
    lua.load(PRELUDE)
        .set_name("=protect")
        .call::<()>((is_signal, watch))
}
