//! Lua scripting for game flow.
//!
//! Scripts run in a sandboxed Lua state, call into the host through the
//! `era` and `flow` tables, and end up back in Rust as typed outcomes:
//! host signals raised inside a script survive `pcall`, `xpcall` and
//! coroutines and are classified by [`check_special_error`].

pub mod api;
pub mod engine;
pub mod loader;
pub mod protect;
pub mod signal;

pub use api::HostApi;
pub use engine::{ScriptEngine, SAVEDATA_GLOBAL};
pub use loader::{ScriptFile, ScriptLoader, ScriptMetadata};
pub use signal::{check_special_error, classify, CallOutcome, HostSignal};
