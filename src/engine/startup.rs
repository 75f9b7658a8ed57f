//! Startup synchronization
//!
//! Background reader tasks drain the engine's stdout and stderr into a
//! shared queue. The foreground waits on that queue for the port marker
//! while checking that the engine is still alive.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::common::{parse_port_marker, Error, Result, PORT_MARKER};

/// How long each queue poll waits before re-checking the process
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of output lines kept for diagnostics
const RECENT_LINES: usize = 25;

/// Drain `reader` line by line into `tx`
///
/// The task keeps reading after the receiving side is dropped so that the
/// engine never blocks on a full pipe. It ends at EOF or on a read error.
pub fn spawn_line_reader<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                    tracing::debug!("engine | {}", line);
                    // Receiver gone after startup; keep draining
                    let _ = tx.send(line);
                }
                Err(e) => {
                    tracing::debug!("Engine output reader stopped: {}", e);
                    break;
                }
            }
        }
    })
}

/// Consumer side of the engine output queue
pub struct OutputMonitor {
    rx: mpsc::UnboundedReceiver<String>,
    recent: VecDeque<String>,
}

impl OutputMonitor {
    pub fn new(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            rx,
            recent: VecDeque::with_capacity(RECENT_LINES),
        }
    }

    /// The most recent output lines, oldest first
    pub fn recent_output(&self) -> String {
        self.recent.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    fn remember(&mut self, line: &str) {
        if self.recent.len() == RECENT_LINES {
            self.recent.pop_front();
        }
        self.recent.push_back(line.to_string());
    }

    /// Wait for the port marker line
    ///
    /// `has_exited` is checked before every poll so that an engine dying
    /// during startup fails fast instead of running out the clock.
    pub async fn wait_for_port<F>(&mut self, mut has_exited: F, timeout: Duration) -> Result<u16>
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut reason = format!("no marker within {:?}", timeout);

        while Instant::now() < deadline {
            if has_exited() {
                // Collect what the readers still hold for the diagnostics
                while Instant::now() < deadline {
                    match tokio::time::timeout(POLL_INTERVAL, self.rx.recv()).await {
                        Ok(Some(line)) => self.remember(&line),
                        _ => break,
                    }
                }
                reason = "engine exited before announcing its port".to_string();
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match tokio::time::timeout(POLL_INTERVAL.min(remaining), self.rx.recv()).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    // Output closed; the exit check above will catch the process
                    tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
                    continue;
                }
                Err(_) => continue,
            };

            self.remember(&line);
            match parse_port_marker(&line) {
                Some(Ok(port)) => {
                    tracing::info!(port, "Engine announced agent port");
                    return Ok(port);
                }
                Some(Err(value)) => {
                    reason = format!("invalid port value '{}'", value);
                    break;
                }
                None => {}
            }
        }

        Err(Error::PortNotAnnounced {
            marker: PORT_MARKER,
            reason,
            recent_output: self.recent_output(),
        })
    }
}
