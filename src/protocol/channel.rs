//! Line-delimited JSON channel
//!
//! Each message is a single line of compact JSON terminated by `\n`:
//! ```text
//! {"type":"command","name":"noop","id":"smoke:1"}\n
//! ```
//! A single socket read may return a partial message or several messages,
//! so bytes past the first newline are carried over to the next receive.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::common::{Error, Result};

/// Size of each socket read
const READ_CHUNK: usize = 4096;

/// Request/response channel over a byte stream
pub struct LineChannel<S> {
    stream: S,
    /// Bytes received but not yet returned as a line
    buffer: Vec<u8>,
}

impl LineChannel<TcpStream> {
    /// Connect to the engine's agent socket on the loopback interface
    pub async fn connect(port: u16, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(("127.0.0.1", port)))
            .await
            .map_err(|_| Error::ConnectTimeout { port, timeout })?
            .map_err(|source| Error::ConnectFailed { port, source })?;
        stream.set_nodelay(true)?;

        tracing::info!(port, "Connected to engine agent socket");
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> LineChannel<S> {
    /// Wrap an already-connected stream
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    /// Serialize `payload` as one JSON line and write it out
    pub async fn send<T: Serialize + ?Sized>(&mut self, payload: &T) -> Result<()> {
        let mut data = serde_json::to_vec(payload)?;
        tracing::debug!("agent >>> {}", String::from_utf8_lossy(&data));
        data.push(b'\n');

        self.stream.write_all(&data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Wait up to `timeout` for the next line and parse it as a JSON object
    pub async fn receive(&mut self, timeout: Duration) -> Result<Map<String, Value>> {
        let line = tokio::time::timeout(timeout, self.read_line())
            .await
            .map_err(|_| Error::ResponseTimeout(timeout))??;

        let text = std::str::from_utf8(&line)
            .map_err(|_| Error::InvalidJson(String::from_utf8_lossy(&line).into_owned()))?
            .trim();
        tracing::debug!("agent <<< {}", text);

        let parsed: Value =
            serde_json::from_str(text).map_err(|_| Error::InvalidJson(text.to_string()))?;
        match parsed {
            Value::Object(map) => Ok(map),
            _ => Err(Error::NotAnObject(text.to_string())),
        }
    }

    /// Read until the buffer holds a full line, then split it off
    ///
    /// Bytes are appended to the buffer only after a read completes, so a
    /// timeout that cancels this future loses nothing.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                return Ok(line);
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}
