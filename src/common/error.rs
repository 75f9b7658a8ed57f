//! Error types for the agent test driver
//!
//! Errors fall into three groups that map onto process exit codes:
//! configuration problems detected before the engine starts, protocol and
//! process failures during a run, and test-logic failures.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for a failed test or a runtime error
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for configuration and setup errors
pub const EXIT_CONFIG: i32 = 2;

/// Main error type for the agent test driver
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Engine executable not found: {0}")]
    EngineNotFound(String),

    #[error("Project path not found: {0}")]
    ProjectNotFound(PathBuf),

    #[error("Test path not found: {0}")]
    TestPathNotFound(PathBuf),

    #[error("No JSON test files found.")]
    NoTests,

    #[error("Invalid test file {path}: {reason}")]
    InvalidTestFile { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Engine Process Errors ===
    #[error("Engine failed to start: {0}")]
    EngineStartFailed(String),

    #[error("Timed out waiting for {marker} in engine output ({reason}).\nRecent output:\n{recent_output}")]
    PortNotAnnounced {
        marker: &'static str,
        reason: String,
        recent_output: String,
    },

    // === Protocol Errors ===
    #[error("Failed to connect to engine on port {port}: {source}")]
    ConnectFailed {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Timed out connecting to engine on port {port} after {timeout:?}")]
    ConnectTimeout { port: u16, timeout: Duration },

    #[error("Connection closed by server.")]
    ConnectionClosed,

    #[error("Timed out waiting for response after {0:?}")]
    ResponseTimeout(Duration),

    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),

    #[error("Expected JSON object response, got: {0}")]
    NotAnObject(String),

    // === Test Errors ===
    #[error("Missing 'type' in {path} step {index}.")]
    MissingStepType { path: PathBuf, index: usize },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid test file error
    pub fn invalid_test_file(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::InvalidTestFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Whether this error stems from configuration rather than a run
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::EngineNotFound(_)
                | Error::ProjectNotFound(_)
                | Error::TestPathNotFound(_)
                | Error::NoTests
                | Error::InvalidTestFile { .. }
                | Error::Config(_)
                | Error::ConfigParse(_)
                | Error::FileRead { .. }
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_config() {
            EXIT_CONFIG
        } else {
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_exit_with_two() {
        assert_eq!(Error::NoTests.exit_code(), EXIT_CONFIG);
        assert_eq!(
            Error::EngineNotFound("godot".to_string()).exit_code(),
            EXIT_CONFIG
        );
        assert_eq!(
            Error::invalid_test_file(std::path::Path::new("a.json"), "bad").exit_code(),
            EXIT_CONFIG
        );
    }

    #[test]
    fn test_run_errors_exit_with_one() {
        assert_eq!(Error::ConnectionClosed.exit_code(), EXIT_FAILURE);
        assert_eq!(
            Error::ResponseTimeout(Duration::from_secs(5)).exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(
            Error::MissingStepType {
                path: PathBuf::from("t.json"),
                index: 1
            }
            .exit_code(),
            EXIT_FAILURE
        );
    }

    #[test]
    fn test_port_error_includes_recent_output() {
        let err = Error::PortNotAnnounced {
            marker: "AGENT_TCP_PORT=",
            reason: "engine exited".to_string(),
            recent_output: "line one\nline two".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("AGENT_TCP_PORT="));
        assert!(msg.contains("line two"));
    }
}
