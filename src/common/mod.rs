//! Common utilities shared across the driver

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

/// Marker the engine prints once its agent socket is listening
pub const PORT_MARKER: &str = "AGENT_TCP_PORT=";

/// Find the port marker in an engine output line.
///
/// Returns `None` when the line carries no marker, and `Some(Err(value))`
/// when the text after the marker is not a valid port.
pub fn parse_port_marker(line: &str) -> Option<std::result::Result<u16, String>> {
    let marker_start = line.find(PORT_MARKER)?;
    let value = line[marker_start + PORT_MARKER.len()..].trim();
    Some(value.parse::<u16>().map_err(|_| value.to_string()))
}
