//! ==============================================================================
//! analytics.rs - rolling statistics over the retained history
//! ==============================================================================
//!
//! purpose:
//!     averages, gas alert rate and a short-term trend, computed over a
//!     point-in-time copy of the history. an empty history produces the
//!     `NoData` marker rather than dividing by zero.
//!
//! ==============================================================================

use crate::domain::{Provenance, SensorReading};

use serde::Serialize;
use std::time::Duration;

/// number of most recent entries that make up the "recent" window
pub const RECENT_WINDOW: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    pub data_points: usize,
    /// entry count times the nominal poll interval
    pub elapsed_secs: f64,
    pub time_span_minutes: f64,
    pub average_gas: f64,
    pub average_water_cm: f64,
    pub total_gas_alerts: usize,
    pub alert_rate_percent: f64,
    pub recent_average_gas: f64,
    pub trend: Trend,
    /// transport the history was collected from
    pub mode: Provenance,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analytics {
    NoData,
    Summary(AnalyticsSummary),
}

impl Analytics {
    pub fn summary(&self) -> Option<&AnalyticsSummary> {
        match self {
            Self::Summary(s) => Some(s),
            Self::NoData => None,
        }
    }
}

/// compute analytics over `history` (oldest -> newest)
pub fn compute(history: &[SensorReading], poll_interval: Duration, mode: Provenance) -> Analytics {
    if history.is_empty() {
        return Analytics::NoData;
    }

    let count = history.len();
    let n = count as f64;

    let average_gas = mean_gas(history);
    let average_water = history.iter().map(|r| r.water_level_cm).sum::<f64>() / n;
    let total_gas_alerts = history.iter().filter(|r| r.gas_alert).count();

    let recent = &history[count.saturating_sub(RECENT_WINDOW)..];
    let recent_average_gas = mean_gas(recent);

    // compare unrounded means; rounding only applies to what we report
    let trend = if recent_average_gas > average_gas {
        Trend::Increasing
    } else if recent_average_gas < average_gas {
        Trend::Decreasing
    } else {
        Trend::Stable
    };

    let elapsed_secs = n * poll_interval.as_secs_f64();

    Analytics::Summary(AnalyticsSummary {
        data_points: count,
        elapsed_secs: round2(elapsed_secs),
        time_span_minutes: round2(elapsed_secs / 60.0),
        average_gas: round2(average_gas),
        average_water_cm: round2(average_water),
        total_gas_alerts,
        alert_rate_percent: round2(total_gas_alerts as f64 / n * 100.0),
        recent_average_gas: round2(recent_average_gas),
        trend,
        mode,
    })
}

fn mean_gas(entries: &[SensorReading]) -> f64 {
    entries.iter().map(|r| r.gas_concentration as f64).sum::<f64>() / entries.len() as f64
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    
    fn reading(gas: u32, alert: bool, water: f64) -> SensorReading {
        SensorReading {
            gas_concentration: gas,
            gas_alert: alert,
            water_level_cm: water,
            actuator_position: 45,
            timestamp_ms: 0,
            provenance: Provenance::Synthetic,
            status: "test".into(),
        }
    }

    fn summary(a: Analytics) -> AnalyticsSummary {
        a.summary().cloned().expect("expected a summary")
    }

    #[test]
    fn test_empty_history_is_no_data() {
        assert_eq!(
            compute(&[], Duration::from_secs(2), Provenance::Real),
            Analytics::NoData
        );
    }

    #[test]
    fn test_alternating_history_is_stable() {
        let history: Vec<_> = (0..20)
            .map(|i| reading(if i % 2 == 0 { 50 } else { 150 }, false, 20.0))
            .collect();
        let s = summary(compute(&history, Duration::from_secs(2), Provenance::Synthetic));
        assert_eq!(s.average_gas, 100.0);
        assert_eq!(s.recent_average_gas, 100.0);
        assert_eq!(s.trend, Trend::Stable);
    }

    #[test]
    fn test_rising_tail_is_increasing() {
        // alternating 50/150 for the first ten, then the last ten skew high
        let mut history: Vec<_> = (0..10)
            .map(|i| reading(if i % 2 == 0 { 50 } else { 150 }, false, 20.0))
            .collect();
        history.extend((0..10).map(|i| reading(if i < 3 { 50 } else { 150 }, false, 20.0)));

        let s = summary(compute(&history, Duration::from_secs(2), Provenance::Synthetic));
        assert!(s.recent_average_gas > 100.0);
        assert!(s.recent_average_gas > s.average_gas);
        assert_eq!(s.trend, Trend::Increasing);
    }

    #[test]
    fn test_falling_tail_is_decreasing() {
        let mut history: Vec<_> = (0..10).map(|_| reading(200, false, 20.0)).collect();
        history.extend((0..10).map(|_| reading(100, false, 20.0)));
        let s = summary(compute(&history, Duration::from_secs(2), Provenance::Synthetic));
        assert_eq!(s.average_gas, 150.0);
        assert_eq!(s.recent_average_gas, 100.0);
        assert_eq!(s.trend, Trend::Decreasing);
    }

    #[test]
    fn test_short_history_uses_all_entries_as_recent() {
        let history = vec![reading(10, false, 5.0), reading(20, false, 15.0)];
        let s = summary(compute(&history, Duration::from_secs(5), Provenance::Synthetic));
        assert_eq!(s.recent_average_gas, 15.0);
        assert_eq!(s.average_water_cm, 10.0);
        assert_eq!(s.trend, Trend::Stable);
        assert_eq!(s.elapsed_secs, 10.0);
    }

    #[test]
    fn test_alert_rate_and_time_span() {
        let history = vec![
            reading(300, true, 20.0),
            reading(10, false, 20.0),
            reading(10, false, 20.0),
        ];
        let s = summary(compute(&history, Duration::from_secs(2), Provenance::Synthetic));
        assert_eq!(s.total_gas_alerts, 1);
        assert_eq!(s.alert_rate_percent, 33.33);
        assert_eq!(s.elapsed_secs, 6.0);
        assert_eq!(s.time_span_minutes, 0.1);
    }

    #[test]
    fn test_serializes_with_status_tag() {
        let json = serde_json::to_value(Analytics::NoData).unwrap();
        assert_eq!(json["status"], "no_data");

        let history = [reading(1, false, 1.0)];
        let json = serde_json::to_value(compute(&history, Duration::from_secs(1), Provenance::Real))
            .unwrap();
        assert_eq!(json["status"], "summary");
        assert_eq!(json["trend"], "stable");
        assert_eq!(json["mode"], "real");
    }
}
