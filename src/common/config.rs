//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Engine launch settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Engine launch settings
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Path to the engine executable, or a name looked up on PATH
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Project directory handed to the engine via `--path`
    #[serde(default)]
    pub project: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            project: None,
        }
    }
}

fn default_executable() -> String {
    "godot".to_string()
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// How long to wait for the engine to announce its port
    #[serde(default = "default_startup")]
    pub startup_secs: f64,

    /// How long to wait for each step response
    #[serde(default = "default_response")]
    pub response_secs: f64,

    /// How long to wait for the TCP connection to open
    #[serde(default = "default_connect")]
    pub connect_secs: f64,

    /// How long to wait for the engine to exit after `quit`
    #[serde(default = "default_exit_wait")]
    pub exit_wait_secs: f64,

    /// How long to wait for the engine to exit after a terminate request
    #[serde(default = "default_terminate_wait")]
    pub terminate_wait_secs: f64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            startup_secs: default_startup(),
            response_secs: default_response(),
            connect_secs: default_connect(),
            exit_wait_secs: default_exit_wait(),
            terminate_wait_secs: default_terminate_wait(),
        }
    }
}

fn default_startup() -> f64 {
    10.0
}
fn default_response() -> f64 {
    5.0
}
fn default_connect() -> f64 {
    5.0
}
fn default_exit_wait() -> f64 {
    5.0
}
fn default_terminate_wait() -> f64 {
    5.0
}

impl Timeouts {
    /// Check that every timeout is a positive number of seconds that fits a Duration
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("startup_secs", self.startup_secs),
            ("response_secs", self.response_secs),
            ("connect_secs", self.connect_secs),
            ("exit_wait_secs", self.exit_wait_secs),
            ("terminate_wait_secs", self.terminate_wait_secs),
        ];
        for (name, value) in fields {
            secs(value).map_err(|reason| {
                Error::ConfigParse(format!("timeouts.{}: {}", name, reason))
            })?;
        }
        Ok(())
    }
}

/// Convert a seconds value into a Duration
///
/// Rejects zero, negative, non-finite and out-of-range values.
pub fn secs(value: f64) -> std::result::Result<Duration, String> {
    if value <= 0.0 {
        return Err(format!("timeout must be positive, got {}", value));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|_| format!("timeout out of range, got {}", value))
}

impl Config {
    /// Load configuration from an explicit file, or the default config file
    ///
    /// An explicit path must exist. The default file is optional and
    /// defaults are returned when it is absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from(path);
        }

        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.timeouts.validate()?;
        Ok(config)
    }
}
