//! Configuration module for eraflow.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{EraError, Result};

/// Game flow configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    /// Title shown by the builtin title scene.
    #[serde(default = "default_title")]
    pub title: String,
    /// Directory scanned for `.lua` files.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    /// Directory holding save files.
    #[serde(default = "default_saves_dir")]
    pub saves_dir: String,
    /// Number of user-visible save slots.
    #[serde(default = "default_save_slots")]
    pub save_slots: u32,
    /// Whether the turn end goes through the autosave scene.
    #[serde(default = "default_autosave")]
    pub autosave: bool,
    /// Slot used by autosave; kept outside the user-visible range.
    #[serde(default = "default_autosave_slot")]
    pub autosave_slot: u32,
    /// Whether training ends in the ability-up scene.
    #[serde(default = "default_ability_up")]
    pub ability_up: bool,
}

fn default_title() -> String {
    "eraflow".to_string()
}

fn default_scripts_dir() -> String {
    "scripts".to_string()
}

fn default_saves_dir() -> String {
    "sav".to_string()
}

fn default_save_slots() -> u32 {
    10
}

fn default_autosave() -> bool {
    true
}

fn default_autosave_slot() -> u32 {
    99
}

fn default_ability_up() -> bool {
    true
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            scripts_dir: default_scripts_dir(),
            saves_dir: default_saves_dir(),
            save_slots: default_save_slots(),
            autosave: default_autosave(),
            autosave_slot: default_autosave_slot(),
            ability_up: default_ability_up(),
        }
    }
}

/// Script runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    /// Watchdog countdown in milliseconds (0 = no watchdog).
    #[serde(default = "default_watchdog_timeout")]
    pub watchdog_timeout_ms: u64,
    /// Maximum Lua memory in megabytes (0 = unlimited).
    #[serde(default = "default_max_memory")]
    pub max_memory_mb: usize,
    /// Instructions between two cancellation checks.
    #[serde(default = "default_hook_interval")]
    pub hook_interval: u32,
}

fn default_watchdog_timeout() -> u64 {
    10_000
}

fn default_max_memory() -> usize {
    64
}

fn default_hook_interval() -> u32 {
    1000
}

impl ScriptConfig {
    /// Watchdog countdown, `None` when disabled.
    pub fn watchdog_timeout(&self) -> Option<Duration> {
        (self.watchdog_timeout_ms > 0).then(|| Duration::from_millis(self.watchdog_timeout_ms))
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: default_watchdog_timeout(),
            max_memory_mb: default_max_memory(),
            hook_interval: default_hook_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file; empty logs to the console only.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/eraflow.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Game flow configuration.
    #[serde(default)]
    pub game: GameConfig,
    /// Script runtime configuration.
    #[serde(default)]
    pub script: ScriptConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(EraError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| EraError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `ERAFLOW_SCRIPTS_DIR`: Override the scripts directory
    /// - `ERAFLOW_WATCHDOG_MS`: Override the watchdog countdown
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("ERAFLOW_SCRIPTS_DIR") {
            if !dir.is_empty() {
                self.game.scripts_dir = dir;
            }
        }
        if let Ok(ms) = std::env::var("ERAFLOW_WATCHDOG_MS") {
            if let Ok(ms) = ms.trim().parse() {
                self.script.watchdog_timeout_ms = ms;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - there are no save slots, or so many that they reach the back command
    /// - the autosave slot collides with a user-visible slot
    /// - the hook interval is zero
    pub fn validate(&self) -> Result<()> {
        if self.game.save_slots == 0 {
            return Err(EraError::Config("save_slots must be at least 1".to_string()));
        }
        if self.game.save_slots > 100 {
            return Err(EraError::Config("save_slots must be at most 100".to_string()));
        }
        if self.game.autosave_slot < self.game.save_slots {
            return Err(EraError::Config(format!(
                "autosave_slot {} overlaps user slots 0..{}",
                self.game.autosave_slot, self.game.save_slots
            )));
        }
        if self.script.hook_interval == 0 {
            return Err(EraError::Config("hook_interval must be positive".to_string()));
        }
        Ok(())
    }
}
