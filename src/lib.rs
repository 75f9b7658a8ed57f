//! agent-tcp-test - end-to-end test driver for game engines
//!
//! This library launches an engine process, discovers the TCP port its
//! agent server announces, and runs JSON test steps over a
//! newline-delimited JSON channel.

pub mod cli;
pub mod commands;
pub mod common;
pub mod engine;
pub mod protocol;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use protocol::LineChannel;
