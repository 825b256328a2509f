//! Scene state machine.
//!
//! A game is a graph of named scenes. The [`SceneManager`] runs the current
//! scene, which names its successor; scripts extend or replace scenes through
//! hooks named `<scene>_<kind>_<detail>` (see [`HookKind`]).

pub mod builtin;
pub mod callback;
pub mod holder;
pub mod manager;

pub use builtin::BuiltinScene;
pub use callback::{hook_name, CallbackDispatcher, HookKind, HookSpec, HookTable, Scripter};
pub use holder::{SceneHolder, SceneLinks};
pub use manager::{Flow, Scene, SceneContext, SceneDeps, SceneFn, SceneManager};
