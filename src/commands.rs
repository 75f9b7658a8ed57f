//! CLI argument definitions

use clap::Args;
use std::path::PathBuf;

use crate::common::config::secs;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON test files or directories containing JSON tests
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Engine executable: a path, or a name looked up on PATH (default: godot)
    #[arg(long, alias = "godot")]
    pub engine: Option<String>,

    /// Project directory passed to the engine (default: current directory)
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Fixed port for the agent TCP server instead of waiting for the announced one
    #[arg(long)]
    pub port: Option<u16>,

    /// Run the engine with a visible window
    #[arg(long)]
    pub no_headless: bool,

    /// Seconds to wait for the engine to announce its TCP port (default: 10)
    #[arg(long, value_parser = parse_seconds)]
    pub startup_timeout: Option<f64>,

    /// Seconds to wait for each response (default: 5)
    #[arg(long, value_parser = parse_seconds)]
    pub response_timeout: Option<f64>,

    /// Print every response
    #[arg(long, short)]
    pub verbose: bool,

    /// Configuration file (default: the platform config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Parse a positive number of seconds that fits a Duration
fn parse_seconds(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    secs(value)?;
    Ok(value)
}
