//! Scene Manager: the run loop of the scene state machine.

use std::rc::Rc;

use tracing::{debug, error, info};

use super::builtin::BuiltinScene;
use super::callback::{CallbackDispatcher, HookKind, HookSpec};
use super::holder::{SceneHolder, SceneLinks};
use crate::config::GameConfig;
use crate::io::SharedIo;
use crate::runtime::CancelToken;
use crate::save::{SaveRepository, StateStore};
use crate::{EraError, Result};

/// A named unit of game flow.
pub trait Scene {
    fn name(&self) -> &str;

    /// Run the scene and name its successor.
    ///
    /// `Ok(None)` means the scene produced no successor, which ends the run
    /// loop with [`EraError::NoNextScene`]. [`EraError::SceneNext`] defers to
    /// the next scene set through [`SceneLinks::set_next_by_name`].
    fn next(&self, cx: &mut SceneContext<'_>) -> Result<Option<String>>;

    /// Script hooks this scene may dispatch to, besides the shared
    /// `<scene>_scene` and `<scene>_event_start`.
    fn hooks(&self) -> &[HookSpec] {
        &[]
    }
}

/// Capabilities handed to a running scene.
pub struct SceneContext<'a> {
    pub callbacks: &'a CallbackDispatcher,
    pub io: &'a SharedIo,
    pub links: &'a SceneLinks,
    pub saves: &'a mut dyn SaveRepository,
    pub state: &'a dyn StateStore,
    pub game: &'a GameConfig,
}

impl SceneContext<'_> {
    pub fn print(&self, text: &str) -> Result<()> {
        self.io.borrow_mut().print(text)
    }

    pub fn print_line(&self, text: &str) -> Result<()> {
        self.io.borrow_mut().print_line(text)
    }

    /// Read an integer, asking again until the player enters one.
    pub fn input_int(&self, prompt: &str) -> Result<i64> {
        loop {
            let line = self.io.borrow_mut().input_line(Some(prompt))?;
            match line.trim().parse() {
                Ok(value) => return Ok(value),
                Err(_) => self.print_line("Please enter a number.")?,
            }
        }
    }

    pub fn wait(&self) -> Result<()> {
        self.io.borrow_mut().wait()
    }
}

/// Transition function of a scene registered at runtime.
pub type SceneFn = dyn Fn(&mut SceneContext<'_>) -> Result<Option<String>>;

struct FnScene {
    name: String,
    func: Box<SceneFn>,
}

impl Scene for FnScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn next(&self, cx: &mut SceneContext<'_>) -> Result<Option<String>> {
        (self.func)(cx)
    }
}

/// Collaborators the scenes run against.
pub struct SceneDeps {
    pub callbacks: CallbackDispatcher,
    pub io: SharedIo,
    pub saves: Box<dyn SaveRepository>,
    pub state: Rc<dyn StateStore>,
    pub game: GameConfig,
}

/// Result of one iteration of the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Owns the scene arena and drives it from the current scene.
pub struct SceneManager {
    holder: SceneHolder,
    deps: SceneDeps,
}

impl SceneManager {
    /// Create a manager with every builtin scene registered, starting at
    /// the title scene.
    pub fn new(deps: SceneDeps) -> Self {
        let mut holder = SceneHolder::new();
        for scene in BuiltinScene::ALL {
            holder.insert(Box::new(scene));
        }
        let manager = Self { holder, deps };
        // Title is registered just above.
        let _ = manager.links().set_current(BuiltinScene::Title.as_str());
        manager
    }

    pub fn links(&self) -> &SceneLinks {
        self.holder.links()
    }

    pub fn callbacks(&self) -> &CallbackDispatcher {
        &self.deps.callbacks
    }

    pub fn saves(&self) -> &dyn SaveRepository {
        self.deps.saves.as_ref()
    }

    /// Register a scene backed by a closure, replacing any scene of that name.
    pub fn register_scene<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut SceneContext<'_>) -> Result<Option<String>> + 'static,
    {
        self.register(Box::new(FnScene {
            name: name.to_string(),
            func: Box::new(func),
        }));
    }

    pub fn register(&mut self, scene: Box<dyn Scene>) {
        debug!("registering scene {}", scene.name());
        self.holder.insert(scene);
    }

    /// Remove a scene. Returns whether it was registered.
    pub fn unregister_scene(&mut self, name: &str) -> bool {
        debug!("unregistering scene {}", name);
        self.holder.remove(name).is_some()
    }

    pub fn get_scene(&self, name: &str) -> Result<&dyn Scene> {
        self.holder.get(name)
    }

    pub fn set_next_scene_by_name(&self, name: &str) -> Result<()> {
        self.links().set_next_by_name(name)
    }

    /// Move the cursor without running the current scene.
    pub fn set_current_scene(&self, name: &str) -> Result<()> {
        self.links().set_current(name)
    }

    pub fn current_scene(&self) -> Option<String> {
        self.links().current()
    }

    /// Names of every hook any registered scene may dispatch to.
    pub fn hook_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for scene in self.holder.scenes() {
            let name = scene.name();
            names.push(HookSpec::new(HookKind::Scene, "").name(name));
            names.push(HookSpec::new(HookKind::Event, "start").name(name));
            names.extend(scene.hooks().iter().map(|hook| hook.name(name)));
        }
        names.sort();
        names.dedup();
        names
    }

    /// Re-read which hooks the loaded scripts define.
    pub fn refresh_hooks(&self) {
        self.deps.callbacks.refresh_hooks(self.hook_names());
    }

    /// Run the current scene once and move to its successor.
    pub fn step(&mut self) -> Result<Flow> {
        debug_assert!(self.links().next().is_none(), "next scene left over");

        let links = self.holder.links().clone();
        let current = links
            .current()
            .ok_or_else(|| EraError::SceneNotRegistered("(none)".to_string()))?;
        let scene = self.holder.get(&current)?;

        let mut cx = SceneContext {
            callbacks: &self.deps.callbacks,
            io: &self.deps.io,
            links: &links,
            saves: self.deps.saves.as_mut(),
            state: self.deps.state.as_ref(),
            game: &self.deps.game,
        };

        let next = match scene.next(&mut cx) {
            Ok(Some(next)) => next,
            Ok(None) => return Err(EraError::NoNextScene(current)),
            Err(EraError::SceneNext) => links.take_next().ok_or(EraError::NextSceneNotSet)?,
            Err(EraError::Quit) => {
                info!("quit requested in scene {}", current);
                links.clear_next();
                return Ok(Flow::Quit);
            }
            Err(e) => return Err(e),
        };

        if !links.is_registered(&next) {
            return Err(EraError::SceneNotRegistered(next));
        }
        debug!("scene {} -> {}", current, next);
        links.advance(next);
        Ok(Flow::Continue)
    }

    /// Drive scenes until one quits, `ctx` is cancelled, or an error occurs.
    pub fn run(&mut self, ctx: &CancelToken) -> Result<()> {
        self.links().clear_next();
        loop {
            if let Some(reason) = ctx.reason() {
                info!("scene loop cancelled: {}", reason);
                return Err(EraError::Cancelled(reason));
            }
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => return Ok(()),
                Err(e) => {
                    error!("scene loop stopped: {}", e);
                    self.links().clear_next();
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{shared, BufferIo};
    use crate::runtime::CancelReason;
    use crate::save::MemorySaveRepository;
    use crate::scene::callback::tests::FakeScripter;
    use std::cell::Cell;

    struct NullState;

    impl StateStore for NullState {
        fn snapshot(&self) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }

        fn restore(&self, _data: &serde_json::Value) -> Result<()> {
            Ok(())
        }
    }

    fn manager_with(scripter: FakeScripter, io: BufferIo) -> SceneManager {
        let io = shared(io);
        SceneManager::new(SceneDeps {
            callbacks: CallbackDispatcher::new(Rc::new(scripter), io.clone()),
            io,
            saves: Box::new(MemorySaveRepository::new()),
            state: Rc::new(NullState),
            game: GameConfig::default(),
        })
    }

    fn manager() -> SceneManager {
        manager_with(FakeScripter::default(), BufferIo::new())
    }

    #[test]
    fn test_builtins_registered() {
        let manager = manager();
        for scene in BuiltinScene::ALL {
            assert_eq!(manager.get_scene(scene.as_str()).unwrap().name(), scene.as_str());
        }
        assert_eq!(manager.current_scene(), Some("title".to_string()));
    }

    #[test]
    fn test_two_scene_run_quits_after_two_iterations() {
        let mut manager = manager();
        let iterations = Rc::new(Cell::new(0));

        let count = Rc::clone(&iterations);
        manager.register_scene("a", move |_| {
            count.set(count.get() + 1);
            Ok(Some("b".to_string()))
        });
        let count = Rc::clone(&iterations);
        manager.register_scene("b", move |_| {
            count.set(count.get() + 1);
            Err(EraError::Quit)
        });
        manager.set_current_scene("a").unwrap();

        manager.run(&CancelToken::new()).unwrap();
        assert_eq!(iterations.get(), 2);
        assert_eq!(manager.links().current(), Some("b".to_string()));
        assert_eq!(manager.links().prev(), Some("a".to_string()));
    }

    #[test]
    fn test_scene_next_uses_preset_scene() {
        let mut manager = manager();
        manager.register_scene("a", |cx| {
            cx.links.set_next_by_name("c")?;
            Err(EraError::SceneNext)
        });
        manager.register_scene("b", |_| Ok(Some("b".to_string())));
        manager.register_scene("c", |_| Err(EraError::Quit));
        manager.set_current_scene("a").unwrap();

        assert_eq!(manager.step().unwrap(), Flow::Continue);
        assert_eq!(manager.current_scene(), Some("c".to_string()));
        assert_eq!(manager.links().next(), None);
        assert_eq!(manager.step().unwrap(), Flow::Quit);
    }

    #[test]
    fn test_scene_next_without_preset_fails() {
        let mut manager = manager();
        manager.register_scene("a", |_| Err(EraError::SceneNext));
        manager.set_current_scene("a").unwrap();
        assert!(matches!(
            manager.run(&CancelToken::new()),
            Err(EraError::NextSceneNotSet)
        ));
    }

    #[test]
    fn test_nil_next_scene_fails() {
        let mut manager = manager();
        manager.register_scene("a", |_| Ok(None));
        manager.set_current_scene("a").unwrap();
        match manager.run(&CancelToken::new()) {
            Err(EraError::NoNextScene(name)) => assert_eq!(name, "a"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unregistered_next_scene_fails() {
        let mut manager = manager();
        manager.register_scene("a", |_| Ok(Some("nowhere".to_string())));
        manager.set_current_scene("a").unwrap();
        match manager.run(&CancelToken::new()) {
            Err(EraError::SceneNotRegistered(name)) => assert_eq!(name, "nowhere"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_get_scene_after_unregister() {
        let mut manager = manager();
        manager.register_scene("extra", |_| Ok(Some("base".to_string())));
        assert!(manager.get_scene("extra").is_ok());

        assert!(manager.unregister_scene("extra"));
        assert!(matches!(
            manager.get_scene("extra"),
            Err(EraError::SceneNotRegistered(_))
        ));
        assert!(!manager.unregister_scene("extra"));
        assert!(manager.set_next_scene_by_name("extra").is_err());
    }

    #[test]
    fn test_other_errors_propagate_unchanged() {
        let mut manager = manager();
        manager.register_scene("a", |_| {
            Err(EraError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe closed",
            )))
        });
        manager.set_current_scene("a").unwrap();
        match manager.run(&CancelToken::new()) {
            Err(EraError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_before_first_scene() {
        let mut manager = manager();
        let calls = Rc::new(Cell::new(0));
        let count = Rc::clone(&calls);
        manager.register_scene("a", move |_| {
            count.set(count.get() + 1);
            Ok(Some("a".to_string()))
        });
        manager.set_current_scene("a").unwrap();

        let ctx = CancelToken::new();
        ctx.cancel(CancelReason::Requested);
        assert!(matches!(
            manager.run(&ctx),
            Err(EraError::Cancelled(CancelReason::Requested))
        ));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_loop_without_quit_runs_until_budget() {
        let mut manager = manager();
        manager.register_scene("a", |_| Ok(Some("b".to_string())));
        manager.register_scene("b", |_| Ok(Some("a".to_string())));
        manager.set_current_scene("a").unwrap();

        for _ in 0..100 {
            assert_eq!(manager.step().unwrap(), Flow::Continue);
        }
    }

    #[test]
    fn test_cancel_from_scene_stops_loop() {
        let mut manager = manager();
        let ctx = CancelToken::new();
        let token = ctx.clone();
        manager.register_scene("a", move |_| {
            token.cancel(CancelReason::Timeout);
            Ok(Some("a".to_string()))
        });
        manager.set_current_scene("a").unwrap();
        assert!(matches!(
            manager.run(&ctx),
            Err(EraError::Cancelled(CancelReason::Timeout))
        ));
    }

    #[test]
    fn test_hook_names_cover_builtins() {
        let manager = manager();
        let names = manager.hook_names();
        assert!(names.contains(&"title_scene".to_string()));
        assert!(names.contains(&"load_end_event_start".to_string()));
        assert!(names.contains(&"shop_user_buy".to_string()));
        assert!(names.contains(&"base_replace_command".to_string()));
    }

    #[test]
    fn test_scene_context_reprompts_for_numbers() {
        let io = BufferIo::with_inputs(["abc", " 42 "]);
        let mut manager = manager_with(FakeScripter::default(), io.clone());
        let seen = Rc::new(Cell::new(0));
        let out = Rc::clone(&seen);
        manager.register_scene("a", move |cx| {
            out.set(cx.input_int("> ")?);
            Err(EraError::Quit)
        });
        manager.set_current_scene("a").unwrap();
        manager.run(&CancelToken::new()).unwrap();

        assert_eq!(seen.get(), 42);
        assert!(io.output().contains("Please enter a number."));
    }
}
