//! Top-level run flow
//!
//! Resolves configuration, loads the tests, launches the engine, runs the
//! steps and always tears the engine down afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use tokio::net::TcpStream;

use crate::commands::RunArgs;
use crate::common::config::{secs, Config};
use crate::common::{Error, Result};
use crate::engine::{EngineProcess, LaunchOptions, ShutdownTimeouts};
use crate::protocol::LineChannel;
use crate::testing::{self, RunOptions, RunSummary, TestFile};

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Engine launch settings; `headless` is the caller's preference
    pub launch: LaunchOptions,
    pub startup_timeout: Duration,
    pub response_timeout: Duration,
    pub connect_timeout: Duration,
    pub shutdown: ShutdownTimeouts,
    pub verbose: bool,
}

impl RunConfig {
    /// Merge CLI arguments over the configuration file
    ///
    /// Fails when the engine or the project directory cannot be found.
    pub fn resolve(args: &RunArgs, config: &Config) -> Result<Self> {
        let engine = args
            .engine
            .as_deref()
            .unwrap_or(config.engine.executable.as_str());
        let executable = resolve_executable(engine)?;

        let project = match args.project.clone().or_else(|| config.engine.project.clone()) {
            Some(project) => project,
            None => std::env::current_dir().map_err(|e| {
                Error::Config(format!("Cannot determine the current directory: {}", e))
            })?,
        };
        if !project.exists() {
            return Err(Error::ProjectNotFound(project));
        }

        let timeouts = &config.timeouts;
        let response_timeout = duration(
            "response timeout",
            args.response_timeout.unwrap_or(timeouts.response_secs),
        )?;

        Ok(Self {
            launch: LaunchOptions {
                executable,
                project,
                headless: !args.no_headless,
                port: args.port,
            },
            startup_timeout: duration(
                "startup timeout",
                args.startup_timeout.unwrap_or(timeouts.startup_secs),
            )?,
            response_timeout,
            connect_timeout: duration("connect timeout", timeouts.connect_secs)?,
            shutdown: ShutdownTimeouts {
                response: response_timeout,
                exit_wait: duration("exit wait", timeouts.exit_wait_secs)?,
                terminate_wait: duration("terminate wait", timeouts.terminate_wait_secs)?,
            },
            verbose: args.verbose,
        })
    }
}

fn duration(name: &str, value: f64) -> Result<Duration> {
    secs(value).map_err(|reason| Error::Config(format!("Invalid {}: {}", name, reason)))
}

/// Find the engine executable
///
/// Existing paths are used as given; bare names are searched on PATH.
fn resolve_executable(engine: &str) -> Result<PathBuf> {
    let path = Path::new(engine);
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.components().count() == 1 {
        if let Ok(found) = which::which(engine) {
            return Ok(found);
        }
    }
    Err(Error::EngineNotFound(engine.to_string()))
}

/// Run the CLI invocation end to end
pub async fn run(args: RunArgs) -> Result<RunSummary> {
    let config = Config::load(args.config.as_deref())?;
    let run_config = RunConfig::resolve(&args, &config)?;

    let tests = testing::load_tests(&args.paths)?;
    if tests.is_empty() {
        return Err(Error::NoTests);
    }

    let summary = execute(&run_config, &tests).await?;
    report_summary(&summary);
    Ok(summary)
}

/// Launch the engine, run `tests` against it and shut it down
///
/// The engine is shut down whatever happened during the run; shutdown
/// problems never replace the run's own result.
pub async fn execute(config: &RunConfig, tests: &[TestFile]) -> Result<RunSummary> {
    let mut launch = config.launch.clone();
    if launch.headless && testing::has_screenshot(tests) {
        println!("Detected screenshot command; running with a visible window.");
        launch.headless = false;
    }

    let mut engine = EngineProcess::spawn(&launch)?;
    let mut channel = None;

    let result = drive(&mut engine, &mut channel, config, launch.port, tests).await;

    engine.shutdown(channel.as_mut(), config.shutdown).await;
    result
}

async fn drive(
    engine: &mut EngineProcess,
    channel: &mut Option<LineChannel<TcpStream>>,
    config: &RunConfig,
    fixed_port: Option<u16>,
    tests: &[TestFile],
) -> Result<RunSummary> {
    let port = match fixed_port {
        Some(port) => {
            engine.release_output();
            port
        }
        None => engine.wait_for_port(config.startup_timeout).await?,
    };

    let channel = channel.insert(LineChannel::connect(port, config.connect_timeout).await?);

    let options = RunOptions {
        response_timeout: config.response_timeout,
        verbose: config.verbose,
    };
    testing::run_tests(channel, tests, &options).await
}

fn report_summary(summary: &RunSummary) {
    if summary.passed() {
        println!(
            "\n{} {} file(s), {} step(s)",
            "All tests passed:".green().bold(),
            summary.files_passed,
            summary.steps_run
        );
    } else {
        println!(
            "\n{} {} failure(s) after {} step(s)",
            "Test run failed:".red().bold(),
            summary.failures,
            summary.steps_run
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["agent-tcp-test", "tests.json"];
        argv.extend_from_slice(extra);
        TestCli::try_parse_from(argv).unwrap().run
    }

    fn existing_executable() -> String {
        std::env::current_exe().unwrap().display().to_string()
    }

    #[test]
    fn test_resolve_uses_cli_over_config() {
        let dir = tempfile::tempdir().unwrap();
        let exe = existing_executable();
        let project = dir.path().display().to_string();
        let config = Config::parse("[timeouts]\nstartup_secs = 30\nresponse_secs = 8\n").unwrap();

        let resolved = RunConfig::resolve(
            &args(&["--engine", &exe, "--project", &project, "--response-timeout", "1.5"]),
            &config,
        )
        .unwrap();

        assert_eq!(resolved.launch.executable, PathBuf::from(&exe));
        assert_eq!(resolved.launch.project, dir.path());
        assert!(resolved.launch.headless);
        assert_eq!(resolved.startup_timeout, Duration::from_secs(30));
        assert_eq!(resolved.response_timeout, Duration::from_millis(1500));
        assert_eq!(resolved.shutdown.response, Duration::from_millis(1500));
    }

    #[test]
    fn test_resolve_project_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse(&format!(
            "[engine]\nexecutable = {:?}\nproject = {:?}\n",
            existing_executable(),
            dir.path().display().to_string()
        ))
        .unwrap();

        let resolved = RunConfig::resolve(&args(&["--no-headless", "--port", "7000"]), &config).unwrap();
        assert_eq!(resolved.launch.project, dir.path());
        assert!(!resolved.launch.headless);
        assert_eq!(resolved.launch.port, Some(7000));
    }

    #[test]
    fn test_missing_engine() {
        let config = Config::default();
        let err = RunConfig::resolve(&args(&["--engine", "/no/such/godot"]), &config).unwrap_err();
        assert!(matches!(err, Error::EngineNotFound(_)));
        assert_eq!(err.exit_code(), crate::common::error::EXIT_CONFIG);

        let err = RunConfig::resolve(&args(&["--engine", "no-such-engine-on-path-xyz"]), &config)
            .unwrap_err();
        assert!(matches!(err, Error::EngineNotFound(_)));
    }

    #[test]
    fn test_out_of_range_timeout_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let exe = existing_executable();
        let project = dir.path().display().to_string();
        let mut run_args = args(&["--engine", &exe, "--project", &project]);
        run_args.response_timeout = Some(1e20);

        let err = RunConfig::resolve(&run_args, &Config::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.exit_code(), crate::common::error::EXIT_CONFIG);
    }

    #[test]
    fn test_missing_project() {
        let exe = existing_executable();
        let err = RunConfig::resolve(
            &args(&["--engine", &exe, "--project", "/no/such/project"]),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound(_)));
        assert_eq!(err.exit_code(), crate::common::error::EXIT_CONFIG);
    }
}
