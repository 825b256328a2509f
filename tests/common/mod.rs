//! Test helpers for game-level tests.
//!
//! Builds a [`GameHost`] over in-memory I/O and saves, with scripts given
//! inline instead of loaded from a directory.

#![allow(dead_code)]

use eraflow::save::MemorySaveRepository;
use eraflow::{BufferIo, Config, GameHost, HostHandle};

/// Configuration with the watchdog disabled.
pub fn quiet_config() -> Config {
    let mut config = Config::default();
    config.script.watchdog_timeout_ms = 0;
    config
}

/// Configuration with a short watchdog and frequent interrupt checks.
pub fn watchdog_config(timeout_ms: u64) -> Config {
    let mut config = Config::default();
    config.script.watchdog_timeout_ms = timeout_ms;
    config.script.hook_interval = 100;
    config
}

/// Build a game with scripted input and the given Lua source loaded.
pub fn game(config: Config, inputs: &[&str], script: &str) -> (GameHost, BufferIo) {
    game_with_handle(config, inputs, script, HostHandle::new())
}

pub fn game_with_handle(
    config: Config,
    inputs: &[&str],
    script: &str,
    handle: HostHandle,
) -> (GameHost, BufferIo) {
    let io = BufferIo::with_inputs(inputs.iter().copied());
    let mut host = GameHost::with_saves(
        config,
        io.clone(),
        handle,
        Box::new(MemorySaveRepository::new()),
    )
    .unwrap();
    host.load_source(script, "=game").unwrap();
    (host, io)
}
