//! eraflow - a Lua-scripted, era-style game flow host.
//!
//! Games are graphs of scenes driven by a [`SceneManager`]. Scripts hook into
//! the builtin scenes or replace them, under a watchdog that stops runaway
//! scripts and a task queue that lets other threads act at safe points.

pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod io;
pub mod logging;
pub mod runtime;
pub mod save;
pub mod scene;
pub mod script;

pub use config::Config;
pub use error::{EraError, Result};
pub use host::{GameHost, HostHandle};
pub use io::{BufferIo, GameIo, SharedIo};
pub use runtime::{CancelReason, CancelToken, TaskQueue, Watchdog};
pub use save::{FileSaveRepository, MemorySaveRepository, SaveData, SaveRepository, StateStore};
pub use scene::{BuiltinScene, CallbackDispatcher, HookKind, Scene, SceneContext, SceneManager};
pub use script::{HostSignal, ScriptEngine};
