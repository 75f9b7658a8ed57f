//! Configuration paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/agent-tcp-test/`
//! - macOS: `~/Library/Application Support/agent-tcp-test/`
//! - Windows: `%APPDATA%\agent-tcp-test\`

use std::path::PathBuf;

/// Application name used for the configuration directory
const APP_NAME: &str = "agent-tcp-test";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}
