//! Error taxonomy for the telemetry controller.
//!
//! Nothing in here is fatal to the process: connection errors are reported
//! to the caller and reflected in the connection state, read errors are
//! absorbed by the monitor loop and retried on the next cycle.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// No channel matched the vendor allow-list.
    #[error("no matching serial device found; specify a channel explicitly")]
    DiscoveryFailure,

    /// The channel exists but could not be opened.
    #[error("failed to open {channel}: {reason}")]
    ConnectFailure { channel: String, reason: String },

    /// Nothing arrived within the read window.
    #[error("no data received from device")]
    NoData,

    /// Malformed payload, device error or closed channel.
    #[error("read failure: {0}")]
    ReadFailure(String),

    #[error("not connected")]
    NotConnected,

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),
}

impl TelemetryError {
    /// Errors the monitor loop shrugs off and retries next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NoData | Self::ReadFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
