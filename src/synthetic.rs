//! ==============================================================================
//! synthetic.rs - simulated sensor board
//! ==============================================================================
//!
//! purpose:
//!     produces plausible readings with no I/O, for deployments that have no
//!     board attached (cloud demos, CI, development machines).
//!
//! design:
//!     values are drawn from bounded ranges. the gas alert flag is NOT random:
//!     it is derived from the current gas threshold, so simulated data always
//!     agrees with whatever policy the operator has configured.
//!
//! relationships:
//!     - implements: transport.rs (Transport, TransportProvider)
//!     - reads: thresholds.rs (gas threshold at generation time)
//!
//! ==============================================================================

use crate::domain::{ChannelInfo, Provenance, SensorReading};
use crate::error::Result;
use crate::thresholds::ThresholdStore;
use crate::transport::{MonotonicClock, Transport, TransportProvider};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

pub const MOCK_CHANNEL: &str = "MOCK_PORT";
const MOCK_STATUS: &str = "mock_connected";

/// servo positions the board moves between
pub const ACTUATOR_POSITIONS: [i32; 5] = [0, 45, 90, 135, 180];

/// live readings
const GAS_RANGE: RangeInclusive<u32> = 20..=300;
const WATER_RANGE: RangeInclusive<u32> = 5..=80;

/// back-filled history is a little tamer than live data
const BACKFILL_GAS_RANGE: RangeInclusive<u32> = 30..=200;
const BACKFILL_WATER_RANGE: RangeInclusive<u32> = 10..=60;

// ==============================================================================
// generator
// ==============================================================================

struct Generator {
    rng: StdRng,
    thresholds: ThresholdStore,
}

impl Generator {
    fn reading(
        &mut self,
        gas: &RangeInclusive<u32>,
        water: &RangeInclusive<u32>,
        timestamp_ms: u64,
    ) -> SensorReading {
        let gas_concentration = self.rng.gen_range(gas.clone());
        let water_level_cm = self.rng.gen_range(water.clone()) as f64;
        let actuator_position = *ACTUATOR_POSITIONS.choose(&mut self.rng).unwrap_or(&90);

        SensorReading {
            gas_concentration,
            gas_alert: gas_concentration > self.thresholds.get().gas,
            water_level_cm,
            actuator_position,
            timestamp_ms,
            provenance: Provenance::Synthetic,
            status: MOCK_STATUS.to_string(),
        }
    }
}

// ==============================================================================
// provider
// ==============================================================================

pub struct SyntheticProvider {
    thresholds: ThresholdStore,
    clock: Arc<MonotonicClock>,
    poll_interval: Duration,
    rng: Mutex<StdRng>,
}

impl SyntheticProvider {
    pub fn new(
        thresholds: ThresholdStore,
        clock: Arc<MonotonicClock>,
        poll_interval: Duration,
    ) -> Self {
        Self::with_rng(thresholds, clock, poll_interval, StdRng::from_entropy())
    }

    /// deterministic output, for tests
    pub fn seeded(
        thresholds: ThresholdStore,
        clock: Arc<MonotonicClock>,
        poll_interval: Duration,
        seed: u64,
    ) -> Self {
        Self::with_rng(thresholds, clock, poll_interval, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        thresholds: ThresholdStore,
        clock: Arc<MonotonicClock>,
        poll_interval: Duration,
        rng: StdRng,
    ) -> Self {
        Self {
            thresholds,
            clock,
            poll_interval,
            rng: Mutex::new(rng),
        }
    }

    /// fresh generator seeded from the provider's own rng
    fn generator(&self) -> Generator {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Generator {
            rng: StdRng::from_rng(&mut *rng).unwrap_or_else(|_| StdRng::from_entropy()),
            thresholds: self.thresholds.clone(),
        }
    }
}

impl TransportProvider for SyntheticProvider {
    fn provenance(&self) -> Provenance {
        Provenance::Synthetic
    }

    fn list_channels(&self) -> Vec<ChannelInfo> {
        vec![
            ChannelInfo {
                id: MOCK_CHANNEL.to_string(),
                description: "Mock Arduino Device".to_string(),
            },
            ChannelInfo {
                id: "COM_MOCK".to_string(),
                description: "Simulated COM Port".to_string(),
            },
        ]
    }

    fn discover(&self) -> Result<String> {
        Ok(MOCK_CHANNEL.to_string())
    }

    fn open(&self, channel: &str) -> Result<Box<dyn Transport>> {
        debug!(channel, "opening synthetic transport");
        Ok(Box::new(SyntheticTransport {
            generator: self.generator(),
            clock: self.clock.clone(),
        }))
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// `count` readings spaced one poll interval apart, ending now
    fn backfill(&self, count: usize) -> Vec<SensorReading> {
        let mut generator = self.generator();
        let now = self.clock.now_ms();
        let step = self.poll_interval.as_millis() as u64;

        (0..count)
            .map(|i| {
                let age = (count - i) as u64 * step;
                let ts = now.saturating_sub(age);
                generator.reading(&BACKFILL_GAS_RANGE, &BACKFILL_WATER_RANGE, ts)
            })
            .collect()
    }
}

// ==============================================================================
// transport
// ==============================================================================

pub struct SyntheticTransport {
    generator: Generator,
    clock: Arc<MonotonicClock>,
}

impl Transport for SyntheticTransport {
    fn acquire(&mut self) -> Result<SensorReading> {
        let ts = self.clock.now_ms();
        Ok(self.generator.reading(&GAS_RANGE, &WATER_RANGE, ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(seed: u64) -> (SyntheticProvider, ThresholdStore) {
        let thresholds = ThresholdStore::default();
        let p = SyntheticProvider::seeded(
            thresholds.clone(),
            Arc::new(MonotonicClock::new()),
            Duration::from_secs(2),
            seed,
        );
        (p, thresholds)
    }

    #[test]
    fn test_alert_flag_tracks_threshold() {
        let (p, thresholds) = provider(7);
        let mut t = p.open(MOCK_CHANNEL).unwrap();

        for gas in [20, 100, 150, 299] {
            thresholds.set(Some(gas), None).unwrap();
            for _ in 0..200 {
                let r = t.acquire().unwrap();
                assert_eq!(r.gas_alert, r.gas_concentration > gas, "reading {:?}", r);
            }
        }
    }

    #[test]
    fn test_values_stay_in_range() {
        let (p, _) = provider(11);
        let mut t = p.open(MOCK_CHANNEL).unwrap();
        let mut last_ts = 0;
        for _ in 0..500 {
            let r = t.acquire().unwrap();
            assert!(GAS_RANGE.contains(&r.gas_concentration));
            assert!((5.0..=80.0).contains(&r.water_level_cm));
            assert!(ACTUATOR_POSITIONS.contains(&r.actuator_position));
            assert_eq!(r.provenance, Provenance::Synthetic);
            assert!(r.timestamp_ms >= last_ts);
            last_ts = r.timestamp_ms;
        }
    }

    #[test]
    fn test_placeholder_channels() {
        let (p, _) = provider(1);
        let channels = p.list_channels();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].id, "MOCK_PORT");
        assert_eq!(channels[1].id, "COM_MOCK");
        assert_eq!(p.discover().unwrap(), "MOCK_PORT");
    }

    #[test]
    fn test_backfill_is_ordered_and_in_the_past() {
        let (p, thresholds) = provider(3);
        let history = p.backfill(20);
        assert_eq!(history.len(), 20);

        let gas = thresholds.get().gas;
        for pair in history.windows(2) {
            assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
        }
        for r in &history {
            assert!(BACKFILL_GAS_RANGE.contains(&r.gas_concentration));
            assert_eq!(r.gas_alert, r.gas_concentration > gas);
        }

        // the next live reading is never older than the backfill
        let live = p.open(MOCK_CHANNEL).unwrap().acquire().unwrap();
        assert!(live.timestamp_ms >= history.last().unwrap().timestamp_ms);
    }
}
