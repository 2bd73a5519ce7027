//! Configuration loading and validation for Spindle.
//!
//! Loads configuration from `~/.spindle/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use spindle_core::Jid;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.spindle/config.toml`. Every section and field is
/// optional in the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Identity and event settings of the local agent
    #[serde(default)]
    pub agent: AgentConfig,

    /// Defaults applied to behaviours that don't choose their own
    #[serde(default)]
    pub behaviour: BehaviourConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Address of the local agent, `local@domain[/resource]`
    #[serde(default = "default_jid")]
    pub jid: String,

    /// Buffer size of the lifecycle event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_jid() -> String {
    "agent@localhost".into()
}
fn default_event_capacity() -> usize {
    256
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            jid: default_jid(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl AgentConfig {
    /// The configured address, parsed.
    pub fn jid(&self) -> Result<Jid, ConfigError> {
        Jid::parse(&self.jid)
            .map_err(|e| ConfigError::ValidationError(format!("agent.jid '{}': {e}", self.jid)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviourConfig {
    /// How long `receive` waits by default. 0 means don't wait.
    #[serde(default = "default_receive_timeout_ms")]
    pub default_receive_timeout_ms: u64,

    /// Period used for periodic behaviours that don't set one
    #[serde(default = "default_period_ms")]
    pub default_period_ms: u64,
}

fn default_receive_timeout_ms() -> u64 {
    1000
}
fn default_period_ms() -> u64 {
    1000
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            default_receive_timeout_ms: default_receive_timeout_ms(),
            default_period_ms: default_period_ms(),
        }
    }
}

impl BehaviourConfig {
    /// `None` when receives should not block.
    pub fn receive_timeout(&self) -> Option<Duration> {
        match self.default_receive_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.default_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `spindle_behaviour=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.spindle/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `SPINDLE_JID` replaces `agent.jid`
    /// - `SPINDLE_LOG` replaces `logging.level`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Overlay values found through `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(jid) = lookup("SPINDLE_JID") {
            tracing::debug!(jid = %jid, "Agent jid overridden from environment");
            self.agent.jid = jid;
        }
        if let Some(level) = lookup("SPINDLE_LOG") {
            self.logging.level = level;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".spindle")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.agent.jid()?;

        if self.agent.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "agent.event_capacity must be > 0".into(),
            ));
        }

        if self.behaviour.default_period_ms == 0 {
            return Err(ConfigError::ValidationError(
                "behaviour.default_period_ms must be > 0".into(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.level must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `spindle config --default`).
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
