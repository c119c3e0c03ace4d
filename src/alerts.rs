//! Alert evaluation.
//!
//! Alerts are never stored; they are recomputed from the latest reading and
//! the current thresholds every time someone asks.

use crate::domain::{AlertEvent, AlertKind, SensorReading, Severity, Thresholds};

/// Active alerts for `reading` under `thresholds`.
///
/// - `gas_leak` (critical) when the reading's gas alert flag is set
/// - `water_level` (warning) when the level is strictly below the critical level
pub fn evaluate(reading: Option<&SensorReading>, thresholds: &Thresholds) -> Vec<AlertEvent> {
    let Some(reading) = reading else {
        return Vec::new();
    };

    let mut alerts = Vec::with_capacity(2);

    if reading.gas_alert {
        alerts.push(AlertEvent {
            kind: AlertKind::GasLeak,
            severity: Severity::Critical,
            message: format!(
                "Gas leak detected! Concentration: {}",
                reading.gas_concentration
            ),
            timestamp_ms: reading.timestamp_ms,
            provenance: reading.provenance,
        });
    }

    if reading.water_level_cm < thresholds.water_critical_cm {
        alerts.push(AlertEvent {
            kind: AlertKind::WaterLevel,
            severity: Severity::Warning,
            message: format!("Low water level: {} cm", reading.water_level_cm),
            timestamp_ms: reading.timestamp_ms,
            provenance: reading.provenance,
        });
    }

    alerts
}
