//! Runtime-adjustable alert thresholds.
//!
//! Both values live behind a single lock so a reader always sees a pair
//! that was written together. A std lock is used because the synthetic
//! transport reads the gas threshold from the blocking pool.

use crate::domain::Thresholds;
use crate::error::{Result, TelemetryError};

use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

#[derive(Clone, Debug, Default)]
pub struct ThresholdStore {
    inner: Arc<RwLock<Thresholds>>,
}

impl ThresholdStore {
    pub fn new(initial: Thresholds) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> Thresholds {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the provided fields; `None` leaves a field unchanged.
    pub fn set(&self, gas: Option<u32>, water_critical_cm: Option<f64>) -> Result<Thresholds> {
        if let Some(level) = water_critical_cm {
            if !level.is_finite() || level < 0.0 {
                return Err(TelemetryError::InvalidThreshold(format!(
                    "water level must be a non-negative number, got {}",
                    level
                )));
            }
        }

        let updated = {
            let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(gas) = gas {
                guard.gas = gas;
            }
            if let Some(level) = water_critical_cm {
                guard.water_critical_cm = level;
            }
            *guard
        };

        info!(
            gas = updated.gas,
            water_critical_cm = updated.water_critical_cm,
            "thresholds updated"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_update_keeps_other_field() {
        let store = ThresholdStore::default();
        let t = store.set(Some(150), None).unwrap();
        assert_eq!(t.gas, 150);
        assert_eq!(t.water_critical_cm, 10.0);

        let t = store.set(None, Some(4.5)).unwrap();
        assert_eq!(t.gas, 150);
        assert_eq!(t.water_critical_cm, 4.5);
        assert_eq!(store.get(), t);
    }

    #[test]
    fn test_rejects_invalid_water_level() {
        let store = ThresholdStore::default();
        assert!(matches!(
            store.set(Some(1), Some(-1.0)),
            Err(TelemetryError::InvalidThreshold(_))
        ));
        assert!(store.set(None, Some(f64::NAN)).is_err());
        // a rejected update changes nothing, not even the valid field
        assert_eq!(store.get(), Thresholds::default());
    }

    #[test]
    fn test_concurrent_updates_never_tear() {
        let store = ThresholdStore::default();
        let writers: Vec<_> = (0..4u32)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..500u32 {
                        let v = w * 1000 + i;
                        store.set(Some(v), Some(v as f64)).unwrap();
                    }
                })
            })
            .collect();

        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    let t = store.get();
                    if t != Thresholds::default() {
                        assert_eq!(t.gas as f64, t.water_critical_cm);
                    }
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
    }
}
