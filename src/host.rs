//! Wiring of a complete game: engine, scenes, watchdog and host API.

use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::io::{shared, GameIo, KeepAliveIo, SharedIo};
use crate::runtime::{CancelReason, CancelToken, TaskQueue, Watchdog};
use crate::save::{FileSaveRepository, SaveRepository};
use crate::scene::{CallbackDispatcher, SceneDeps, SceneManager};
use crate::script::{HostApi, ScriptEngine};
use crate::{EraError, Result};

/// Thread-safe handle for controlling a running game from outside.
///
/// Clones share the same queue and cancellation context.
#[derive(Clone, Default)]
pub struct HostHandle {
    queue: Arc<TaskQueue>,
    cancel: CancelToken,
}

impl HostHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task for the script thread. Returns `false` when the queue is full.
    pub fn try_append<F>(&self, task: F) -> bool
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.queue.try_append(task)
    }

    /// Ask the game to quit at the next script call.
    pub fn request_quit(&self) -> bool {
        self.try_append(|| Err(EraError::Quit))
    }

    /// Cancel the game immediately, interrupting any running script.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel(CancelReason::Requested)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// A game ready to run on the current thread.
///
/// The watchdog, if enabled, counts script time only, loading included.
/// Waiting for the player and the gap between loading and [`run`](Self::run)
/// pause it. A `GameHost` runs once; its watchdog does not restart.
pub struct GameHost {
    config: Config,
    handle: HostHandle,
    watchdog: Option<Arc<Watchdog>>,
    engine: Rc<ScriptEngine>,
    manager: SceneManager,
}

impl GameHost {
    /// Build a game saving to the configured save directory.
    pub fn new<I: GameIo + 'static>(config: Config, io: I, handle: HostHandle) -> Result<Self> {
        let saves = FileSaveRepository::new(&config.game.saves_dir);
        Self::with_saves(config, io, handle, Box::new(saves))
    }

    /// Build a game with a custom save repository.
    pub fn with_saves<I: GameIo + 'static>(
        config: Config,
        io: I,
        handle: HostHandle,
        saves: Box<dyn SaveRepository>,
    ) -> Result<Self> {
        config.validate()?;

        let watchdog = config
            .script
            .watchdog_timeout()
            .map(|timeout| Arc::new(Watchdog::new(timeout)));
        let io: SharedIo = match &watchdog {
            Some(watchdog) => shared(KeepAliveIo::new(io, Arc::clone(watchdog))),
            None => shared(io),
        };

        let engine = Rc::new(ScriptEngine::new(
            &config.script,
            handle.cancel.clone(),
            Arc::clone(&handle.queue),
        )?);
        let callbacks = CallbackDispatcher::new(engine.clone(), io.clone());
        let manager = SceneManager::new(SceneDeps {
            callbacks,
            io: io.clone(),
            saves,
            state: engine.clone(),
            game: config.game.clone(),
        });

        HostApi::new(io, manager.links().clone(), Arc::clone(&handle.queue))
            .register(engine.lua())
            .map_err(|e| EraError::Script(format!("Failed to register host API: {}", e)))?;

        Ok(Self {
            config,
            handle,
            watchdog,
            engine,
            manager,
        })
    }

    /// Load the configured scripts directory.
    pub fn load_configured_scripts(&mut self) -> Result<usize> {
        let dir = self.config.game.scripts_dir.clone();
        self.load_scripts(dir)
    }

    /// Load every enabled script under `dir` and re-read the hook table.
    pub fn load_scripts<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize> {
        let count = self.guarded(|| self.engine.load_dir(dir))?;
        self.manager.refresh_hooks();
        Ok(count)
    }

    /// Run a single chunk of Lua and re-read the hook table.
    pub fn load_source(&mut self, source: &str, chunk_name: &str) -> Result<()> {
        self.guarded(|| self.engine.execute(source, chunk_name))?;
        self.manager.refresh_hooks();
        Ok(())
    }

    /// Start the countdown, or restart it from full if it is paused.
    fn arm_watchdog(&self) {
        if let Some(watchdog) = &self.watchdog {
            if !watchdog.reset() && !watchdog.run(self.handle.cancel_token()) {
                warn!("watchdog could not be started");
            }
        }
    }

    /// Run top-level script code outside the scene loop under the watchdog.
    fn guarded<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.arm_watchdog();
        let result = f();
        if let Some(watchdog) = &self.watchdog {
            watchdog.stop();
        }
        result
    }

    /// Drive the scene loop until the game quits, is cancelled, or fails.
    pub fn run(&mut self) -> Result<()> {
        self.arm_watchdog();
        info!("starting game {}", self.config.game.title);

        let result = self.manager.run(self.handle.cancel_token());

        if let Some(watchdog) = &self.watchdog {
            watchdog.quit();
        }
        match &result {
            Ok(()) => info!("game ended"),
            Err(e) => warn!("game ended with error: {}", e),
        }
        result
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn handle(&self) -> &HostHandle {
        &self.handle
    }

    pub fn watchdog(&self) -> Option<&Arc<Watchdog>> {
        self.watchdog.as_ref()
    }

    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }

    pub fn manager(&self) -> &SceneManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SceneManager {
        &mut self.manager
    }
}
