//! Simulator configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via TICKFSM_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tickfsm_core::EngineConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine configuration.
    pub engine: EngineConfig,
    /// Simulator configuration.
    pub simulator: SimulatorConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("TICKFSM_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        apply_engine_env_overrides(&mut self.engine);
        self.simulator.apply_env_overrides();
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_events_per_tick == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_events_per_tick must be at least 1".to_string(),
            ));
        }
        if self.simulator.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "simulator.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply_engine_env_overrides(engine: &mut EngineConfig) {
    if let Ok(period) = std::env::var("TICKFSM_TICK_PERIOD_MS") {
        if let Ok(ms) = period.parse() {
            engine.tick_period_ms = ms;
        }
    }

    if let Ok(max) = std::env::var("TICKFSM_MAX_EVENTS_PER_TICK") {
        if let Ok(n) = max.parse() {
            engine.max_events_per_tick = n;
        }
    }

    if let Ok(strict) = std::env::var("TICKFSM_STRICT_ACTIONS") {
        engine.strict_actions = strict == "1" || strict.to_lowercase() == "true";
    }
}

/// Crosswalk simulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Machine definition file; the built-in crosswalk is used when unset.
    pub definition: Option<PathBuf>,
    /// Colorize the console display.
    pub color: bool,
    /// How often the host loop calls into the engine.
    pub poll_interval_ms: u64,
    /// Scripted button presses, in milliseconds since start.
    pub push_at_ms: Vec<u64>,
    /// Stop after this many milliseconds.
    pub run_for_ms: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            definition: None,
            color: true,
            poll_interval_ms: 10,
            push_at_ms: Vec::new(),
            run_for_ms: None,
        }
    }
}

impl SimulatorConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TICKFSM_DEFINITION") {
            self.definition = Some(PathBuf::from(path));
        }

        if let Ok(color) = std::env::var("TICKFSM_COLOR") {
            self.color = color == "1" || color.to_lowercase() == "true";
        }

        if let Ok(interval) = std::env::var("TICKFSM_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.poll_interval_ms = ms;
            }
        }
    }

    /// Returns the poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
