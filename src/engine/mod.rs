//! Engine process lifecycle
//!
//! Launches the engine under test, discovers its agent port, and tears it
//! down with an escalating shutdown: `quit` request, natural exit,
//! graceful termination, then a forced kill.

pub mod startup;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::common::{Error, Result};
use crate::protocol::{self, LineChannel};

pub use startup::OutputMonitor;

/// How the engine should be launched
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Engine executable
    pub executable: PathBuf,
    /// Project directory passed with `--path`
    pub project: PathBuf,
    /// Run without a window
    pub headless: bool,
    /// Fixed agent port; `None` lets the engine pick one and announce it
    pub port: Option<u16>,
}

impl LaunchOptions {
    /// Arguments passed to the engine executable
    ///
    /// Engine options come first; the agent options follow the `--`
    /// separator so the engine forwards them to the project.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--path".into(), self.project.clone().into()];
        if self.headless {
            args.push("--headless".into());
        }
        args.push("--".into());
        match self.port {
            None => args.push("--agent-tcp".into()),
            Some(port) => {
                args.push("--agent-tcp-port".into());
                args.push(port.to_string().into());
            }
        }
        args
    }
}

/// Timeouts for the shutdown sequence
#[derive(Debug, Clone, Copy)]
pub struct ShutdownTimeouts {
    /// Wait for the response to `quit`
    pub response: Duration,
    /// Wait for the engine to exit on its own
    pub exit_wait: Duration,
    /// Wait for the engine to exit after a terminate request
    pub terminate_wait: Duration,
}

/// A running engine process
pub struct EngineProcess {
    child: Child,
    /// Output queue consumer, present until startup completes
    output: Option<OutputMonitor>,
}

impl EngineProcess {
    /// Spawn the engine with the given launch options
    pub fn spawn(options: &LaunchOptions) -> Result<Self> {
        let mut cmd = Command::new(&options.executable);
        cmd.args(options.args());

        tracing::debug!(
            executable = %options.executable.display(),
            args = ?options.args(),
            "Spawning engine process"
        );
        Self::spawn_command(cmd).map_err(|e| match e {
            Error::Io(io) => Error::EngineStartFailed(format!(
                "Failed to start {}: {}",
                options.executable.display(),
                io
            )),
            other => other,
        })
    }

    /// Spawn an arbitrary command as the engine
    ///
    /// stdout and stderr are both captured and drained in the background.
    pub fn spawn_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::EngineStartFailed("Failed to capture engine stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::EngineStartFailed("Failed to capture engine stderr".to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        startup::spawn_line_reader(stdout, tx.clone());
        startup::spawn_line_reader(stderr, tx);

        tracing::info!(pid = child.id(), "Engine process started");

        Ok(Self {
            child,
            output: Some(OutputMonitor::new(rx)),
        })
    }

    /// OS process id, if the process has not been reaped yet
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the engine to announce its agent port
    ///
    /// The output queue is released afterwards; the readers keep draining
    /// the engine's output into the debug log.
    pub async fn wait_for_port(&mut self, timeout: Duration) -> Result<u16> {
        let mut monitor = self.output.take().ok_or_else(|| {
            Error::EngineStartFailed("Engine output already consumed".to_string())
        })?;
        let child = &mut self.child;
        monitor
            .wait_for_port(
                || child.try_wait().map(|status| status.is_some()).unwrap_or(true),
                timeout,
            )
            .await
    }

    /// Release the output queue when no port wait is needed
    pub fn release_output(&mut self) {
        self.output = None;
    }

    /// Shut the engine down, never failing
    ///
    /// If a channel is open a `quit` request is sent first. Each later
    /// stage only runs if the previous one did not end the process.
    pub async fn shutdown<S>(mut self, channel: Option<&mut LineChannel<S>>, timeouts: ShutdownTimeouts)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(channel) = channel {
            tracing::debug!("Sending quit request");
            match channel.send(&protocol::quit_request()).await {
                Ok(()) => {
                    if let Err(e) = channel.receive(timeouts.response).await {
                        tracing::debug!("No response to quit: {}", e);
                    }
                }
                Err(e) => tracing::debug!("Failed to send quit: {}", e),
            }
        }

        if let Some(status) = self.wait_exit(timeouts.exit_wait).await {
            tracing::info!(%status, "Engine exited");
            return;
        }

        tracing::info!("Engine still running, requesting termination");
        self.terminate();
        if let Some(status) = self.wait_exit(timeouts.terminate_wait).await {
            tracing::info!(%status, "Engine terminated");
            return;
        }

        tracing::warn!("Engine did not terminate, killing it");
        if let Err(e) = self.child.kill().await {
            tracing::warn!("Failed to kill engine: {}", e);
        }
    }

    async fn wait_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::debug!("Failed to wait for engine: {}", e);
                None
            }
            Err(_) => None,
        }
    }

    /// Ask the process to exit gracefully
    #[cfg(unix)]
    fn terminate(&mut self) {
        if let Some(pid) = self.child.id() {
            // SIGTERM lets the engine run its own cleanup
            let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
            if result != 0 {
                tracing::debug!("Failed to send SIGTERM to {}", pid);
            }
        }
    }

    /// Ask the process to exit gracefully
    #[cfg(not(unix))]
    fn terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!("Failed to terminate engine: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(headless: bool, port: Option<u16>) -> LaunchOptions {
        LaunchOptions {
            executable: PathBuf::from("godot"),
            project: PathBuf::from("/work/game"),
            headless,
            port,
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_args_headless_dynamic_port() {
        assert_eq!(
            strings(options(true, None).args()),
            ["--path", "/work/game", "--headless", "--", "--agent-tcp"]
        );
    }

    #[test]
    fn test_args_windowed_fixed_port() {
        assert_eq!(
            strings(options(false, Some(9080)).args()),
            ["--path", "/work/game", "--", "--agent-tcp-port", "9080"]
        );
    }

    #[cfg(unix)]
    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[cfg(unix)]
    fn quick_timeouts() -> ShutdownTimeouts {
        ShutdownTimeouts {
            response: Duration::from_millis(200),
            exit_wait: Duration::from_millis(300),
            terminate_wait: Duration::from_millis(300),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_port_from_stderr() {
        let mut engine =
            EngineProcess::spawn_command(shell("echo booting; echo AGENT_TCP_PORT=6007 >&2; sleep 5"))
                .unwrap();
        let port = engine.wait_for_port(Duration::from_secs(5)).await.unwrap();
        assert_eq!(port, 6007);
        engine.shutdown::<tokio::io::DuplexStream>(None, quick_timeouts()).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_early_exit_is_reported() {
        let mut engine =
            EngineProcess::spawn_command(shell("echo 'ERROR: cannot open project'; exit 3")).unwrap();

        let started = std::time::Instant::now();
        let err = engine
            .wait_for_port(Duration::from_secs(20))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(err, Error::PortNotAnnounced { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_escalates_to_terminate() {
        let engine = EngineProcess::spawn_command(shell("sleep 30")).unwrap();

        let started = std::time::Instant::now();
        engine.shutdown::<tokio::io::DuplexStream>(None, quick_timeouts()).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_escalates_to_kill() {
        let engine =
            EngineProcess::spawn_command(shell("trap '' TERM; sleep 30 & wait")).unwrap();

        let started = std::time::Instant::now();
        engine.shutdown::<tokio::io::DuplexStream>(None, quick_timeouts()).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_sends_quit() {
        let engine = EngineProcess::spawn_command(shell("exit 0")).unwrap();
        let (client, server) = tokio::io::duplex(1024);
        let mut channel = LineChannel::new(client);

        let peer = tokio::spawn(async move {
            let mut peer = LineChannel::new(server);
            let request = peer.receive(Duration::from_secs(2)).await.unwrap();
            peer.send(&json!({"id": request["id"], "ok": true}))
                .await
                .unwrap();
            request
        });

        engine.shutdown(Some(&mut channel), quick_timeouts()).await;
        let request = peer.await.unwrap();
        assert_eq!(request["name"], "quit");
        assert_eq!(request["id"], protocol::SHUTDOWN_ID);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_swallows_channel_errors() {
        let engine = EngineProcess::spawn_command(shell("exit 0")).unwrap();
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let mut channel = LineChannel::new(client);

        engine.shutdown(Some(&mut channel), quick_timeouts()).await;
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let options = LaunchOptions {
            executable: PathBuf::from("/definitely/not/an/engine"),
            project: PathBuf::from("."),
            headless: true,
            port: None,
        };
        let err = EngineProcess::spawn(&options).err().unwrap();
        assert!(matches!(err, Error::EngineStartFailed(_)));
    }
}
