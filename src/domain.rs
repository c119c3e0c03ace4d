//! ==============================================================================
//! domain.rs - shared data types
//! ==============================================================================
//!
//! purpose:
//!     the plain data that flows between the transport, the monitor task and
//!     the callers of the controller. everything here is serializable so the
//!     web layer in front of the controller can return it unchanged.
//!
//! relationships:
//!     - produced by: synthetic.rs, serial.rs (SensorReading)
//!     - consumed by: history.rs, alerts.rs, analytics.rs, controller.rs
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};

/// where a reading came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Real,
    Synthetic,
}

/// one timestamped sample from the sensor board
///
/// readings are never mutated after they are produced; the history and the
/// latest-reading slot hold clones.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// gas concentration in raw device units
    pub gas_concentration: u32,
    /// gas alert flag (device-reported for real boards, threshold-derived for synthetic)
    pub gas_alert: bool,
    /// water level in centimeters
    pub water_level_cm: f64,
    /// actuator (servo) position in degrees
    pub actuator_position: i32,
    /// capture time, unix epoch milliseconds
    pub timestamp_ms: u64,
    pub provenance: Provenance,
    /// free-form status tag, e.g. "connected" or "mock_connected"
    pub status: String,
}

/// lifecycle of the link to the device
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ConnectFailed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// alert thresholds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// concentration above which the synthetic sensor raises its alert flag
    pub gas: u32,
    /// water level (cm) below which a low-water alert fires
    pub water_critical_cm: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            gas: 100,
            water_critical_cm: 10.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    GasLeak,
    WaterLevel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

/// an active alert, derived on demand from the latest reading
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    /// copied from the reading the alert was derived from
    pub timestamp_ms: u64,
    pub provenance: Provenance,
}

/// a channel the controller could connect to
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    /// device path or placeholder id, e.g. "/dev/ttyACM0"
    pub id: String,
    pub description: String,
}

/// point-in-time view of the controller
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SystemStatus {
    pub connection: ConnectionState,
    pub channel: Option<String>,
    pub monitoring: bool,
    pub mode: Provenance,
    pub samples_retained: usize,
    pub last_sample_ms: Option<u64>,
    pub thresholds: Thresholds,
}
