//! ==============================================================================
//! transport.rs - how a reading is obtained
//! ==============================================================================
//!
//! purpose:
//!     defines the capability the rest of the controller depends on. a
//!     `TransportProvider` knows how to list, discover and open channels for
//!     one kind of device; the `Transport` it opens produces one reading per
//!     call. the variant (serial board or simulator) is chosen once, when
//!     the controller is built, and nothing downstream ever branches on it.
//!
//! relationships:
//!     - implemented by: serial.rs (real board), synthetic.rs (simulator)
//!     - used by: connection.rs (open/close), monitor.rs + controller.rs (reads)
//!
//! ==============================================================================

use crate::domain::{ChannelInfo, Provenance, SensorReading};
use crate::error::{Result, TelemetryError};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// acquire one reading from an open channel
///
/// implementations may block (the serial variant waits up to its read
/// timeout), so callers go through [`SharedTransport`], which runs them on
/// the blocking pool.
pub trait Transport: Send {
    fn acquire(&mut self) -> Result<SensorReading>;
}

/// factory and metadata for one kind of transport
pub trait TransportProvider: Send + Sync {
    /// provenance stamped on every reading this provider produces
    fn provenance(&self) -> Provenance;

    /// channels currently available, as (id, description) pairs
    fn list_channels(&self) -> Vec<ChannelInfo>;

    /// pick a channel when the caller gave no hint
    fn discover(&self) -> Result<String>;

    /// open a channel; may block
    fn open(&self, channel: &str) -> Result<Box<dyn Transport>>;

    /// grace period between opening the channel and declaring it connected
    fn settle_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// nominal spacing between monitor polls
    fn poll_interval(&self) -> Duration;

    /// upper bound on one `acquire` call
    fn read_timeout(&self) -> Duration {
        DEFAULT_READ_WINDOW
    }

    /// readings to seed an empty history with on first connect
    fn backfill(&self, _count: usize) -> Vec<SensorReading> {
        Vec::new()
    }
}

/// read window assumed for providers that don't state one
pub const DEFAULT_READ_WINDOW: Duration = Duration::from_secs(10);

struct ReadSlot {
    transport: Box<dyn Transport>,
    /// outcome of the most recent completed read
    last: Option<Result<SensorReading>>,
}

/// an open transport shared by the monitor task and direct reads
///
/// at most one read is outstanding at a time. reads run on the blocking
/// pool with the slot lock moved into the blocking closure, so waiting for
/// the lock never ties up a runtime thread.
#[derive(Clone)]
pub struct SharedTransport {
    slot: Arc<Mutex<ReadSlot>>,
    /// bumped (under the slot lock) each time a read completes
    completed: Arc<AtomicU64>,
    read_window: Duration,
}

impl std::fmt::Debug for SharedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTransport")
            .field("read_window", &self.read_window)
            .finish_non_exhaustive()
    }
}

impl SharedTransport {
    pub fn new(transport: Box<dyn Transport>, read_window: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(ReadSlot {
                transport,
                last: None,
            })),
            completed: Arc::new(AtomicU64::new(0)),
            read_window,
        }
    }

    /// a fresh read, queued behind any read in flight
    pub async fn read(&self) -> Result<SensorReading> {
        let guard = self.slot.clone().lock_owned().await;
        self.run(guard).await
    }

    /// a read bounded by one read window
    ///
    /// if another read is in flight, waits for it (at most one window) and
    /// returns its outcome instead of starting a second read behind it.
    pub async fn read_or_join(&self) -> Result<SensorReading> {
        let seen = self.completed.load(Ordering::SeqCst);

        let guard = match self.slot.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => tokio::time::timeout(self.read_window, self.slot.clone().lock_owned())
                .await
                .map_err(|_| TelemetryError::NoData)?,
        };

        if self.completed.load(Ordering::SeqCst) != seen {
            if let Some(outcome) = guard.last.clone() {
                return outcome;
            }
        }
        self.run(guard).await
    }

    async fn run(&self, guard: OwnedMutexGuard<ReadSlot>) -> Result<SensorReading> {
        let completed = self.completed.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            let outcome = guard.transport.acquire();
            guard.last = Some(outcome.clone());
            completed.fetch_add(1, Ordering::SeqCst);
            outcome
        })
        .await
        .map_err(|e| TelemetryError::ReadFailure(format!("read task failed: {}", e)))?
    }
}

// ==============================================================================
// clock
// ==============================================================================

/// current unix timestamp in milliseconds
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// wall clock that never goes backwards
///
/// one instance is shared by everything that stamps readings for a
/// controller, so timestamps stay non-decreasing even if the system clock
/// is stepped back.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.observe(timestamp_ms())
    }

    /// fold an externally sourced time into the clock and return the
    /// stamp to use for it
    pub fn observe(&self, ms: u64) -> u64 {
        let prev = self.last.fetch_max(ms, Ordering::SeqCst);
        prev.max(ms)
    }
}
