//! ==============================================================================
//! history.rs - bounded sample history and the latest-reading slot
//! ==============================================================================
//!
//! purpose:
//!     keeps the most recent N readings (oldest evicted first) plus the single
//!     latest reading, behind one lock so status queries see a consistent
//!     count / last-timestamp pair.
//!
//! sharing:
//!     the monitor task is the only writer of the history. readers always get
//!     an owned copy, so nothing they hold can change underneath them, and
//!     the lock is only held for the duration of the copy.
//!
//! ==============================================================================

use crate::domain::SensorReading;

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_CAPACITY: usize = 100;

/// fixed-capacity ring buffer of readings, oldest -> newest
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<SensorReading>,
    capacity: usize,
}

impl HistoryBuffer {
    /// a capacity of zero is bumped to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, reading: SensorReading) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(reading);
    }

    /// the most recent `limit` entries (all if `None`), oldest first
    pub fn snapshot(&self, limit: Option<usize>) -> Vec<SensorReading> {
        let take = limit.unwrap_or(self.entries.len()).min(self.entries.len());
        let skip = self.entries.len() - take;
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&SensorReading> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[derive(Debug)]
struct Samples {
    history: HistoryBuffer,
    latest: Option<SensorReading>,
}

/// shared handle to the history and the latest-reading slot
#[derive(Clone, Debug)]
pub struct SampleStore {
    inner: Arc<RwLock<Samples>>,
}

impl SampleStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Samples {
                history: HistoryBuffer::new(capacity),
                latest: None,
            })),
        }
    }

    /// append to history and make it the latest reading
    pub async fn record(&self, reading: SensorReading) {
        let mut guard = self.inner.write().await;
        guard.latest = Some(reading.clone());
        guard.history.push(reading);
    }

    /// update the latest slot without touching history (direct reads)
    pub async fn set_latest(&self, reading: SensorReading) {
        self.inner.write().await.latest = Some(reading);
    }

    /// seed history with back-dated readings; only applies while empty
    pub async fn backfill(&self, readings: Vec<SensorReading>) -> bool {
        let mut guard = self.inner.write().await;
        if !guard.history.is_empty() || guard.latest.is_some() {
            return false;
        }
        for reading in readings {
            guard.history.push(reading);
        }
        true
    }

    pub async fn latest(&self) -> Option<SensorReading> {
        self.inner.read().await.latest.clone()
    }

    pub async fn snapshot(&self, limit: Option<usize>) -> Vec<SensorReading> {
        self.inner.read().await.history.snapshot(limit)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.history.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.history.is_empty()
    }

    /// (retained count, timestamp of the latest reading)
    pub async fn summary(&self) -> (usize, Option<u64>) {
        let guard = self.inner.read().await;
        let last = guard
            .latest
            .as_ref()
            .or_else(|| guard.history.last())
            .map(|r| r.timestamp_ms);
        (guard.history.len(), last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Provenance;
    use proptest::prelude::*;

    fn reading(n: u32) -> SensorReading {
        SensorReading {
            gas_concentration: n,
            gas_alert: false,
            water_level_cm: 30.0,
            actuator_position: 90,
            timestamp_ms: n as u64,
            provenance: Provenance::Synthetic,
            status: "test".into(),
        }
    }

    fn gas(entries: &[SensorReading]) -> Vec<u32> {
        entries.iter().map(|r| r.gas_concentration).collect()
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut buf = HistoryBuffer::new(3);
        for n in 1..=5 {
            buf.push(reading(n));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(gas(&buf.snapshot(None)), vec![3, 4, 5]);
    }

    #[test]
    fn test_snapshot_limit() {
        let mut buf = HistoryBuffer::new(10);
        for n in 1..=6 {
            buf.push(reading(n));
        }
        assert_eq!(gas(&buf.snapshot(Some(2))), vec![5, 6]);
        assert_eq!(gas(&buf.snapshot(Some(50))), vec![1, 2, 3, 4, 5, 6]);
        assert!(buf.snapshot(Some(0)).is_empty());
    }

    #[test]
    fn test_zero_capacity_is_bumped() {
        let mut buf = HistoryBuffer::new(0);
        buf.push(reading(1));
        buf.push(reading(2));
        assert_eq!(gas(&buf.snapshot(None)), vec![2]);
    }

    proptest! {
        #[test]
        fn prop_snapshot_holds_newest_entries(capacity in 1usize..50, n in 0u32..200) {
            let mut buf = HistoryBuffer::new(capacity);
            for i in 0..n {
                buf.push(reading(i));
            }
            let snap = buf.snapshot(None);
            let expected_len = (n as usize).min(capacity);
            prop_assert_eq!(snap.len(), expected_len);
            let expected: Vec<u32> = (n - expected_len as u32..n).collect();
            prop_assert_eq!(gas(&snap), expected);
        }
    }

    #[tokio::test]
    async fn test_store_record_updates_latest_and_history() {
        let store = SampleStore::new(5);
        store.record(reading(7)).await;
        store.set_latest(reading(8)).await;

        assert_eq!(store.len().await, 1);
        assert_eq!(store.latest().await.unwrap().gas_concentration, 8);
        assert_eq!(store.summary().await, (1, Some(8)));
    }

    #[tokio::test]
    async fn test_backfill_only_when_empty() {
        let store = SampleStore::new(5);
        assert!(store.backfill(vec![reading(1), reading(2)]).await);
        assert!(!store.backfill(vec![reading(3)]).await);
        assert_eq!(gas(&store.snapshot(None).await), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_snapshot_is_independent_copy() {
        let store = SampleStore::new(5);
        store.record(reading(1)).await;
        let snap = store.snapshot(None).await;
        store.record(reading(2)).await;
        assert_eq!(gas(&snap), vec![1]);
    }
}
