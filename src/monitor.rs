//! ==============================================================================
//! monitor.rs - background polling task
//! ==============================================================================
//!
//! purpose:
//!     one tokio task per controller that polls the open transport on a fixed
//!     cadence, appends each reading to the history and refreshes the latest
//!     reading slot.
//!
//! lifecycle:
//!     - start(): no-op if already running, NotConnected if there is no open
//!       transport, otherwise spawns the task and returns immediately
//!     - stop(): raises the stop signal, then joins the task with a bounded
//!       wait. a task that does not exit in time is aborted and logged as
//!       leaked rather than blocking the caller forever.
//!
//! loop body:
//!     check stop signal -> read (on the blocking pool) -> record or log ->
//!     sleep one poll interval, waking early if stop is raised.
//!     read errors are never fatal to the loop; a failed poll is skipped.
//!     cancellation is cooperative: a read in flight is allowed to finish.
//!
//! relationships:
//!     - uses: connection.rs (open transport), history.rs (SampleStore)
//!     - used by: controller.rs
//!
//! ==============================================================================

use crate::connection::ConnectionManager;
use crate::error::Result;
use crate::history::SampleStore;
use crate::transport::SharedTransport;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct MonitorTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct MonitorLoop {
    task: Mutex<Option<MonitorTask>>,
    /// serializes start/stop so a stop in progress can't race a new start
    lifecycle: tokio::sync::Mutex<()>,
    stop_timeout: Duration,
    show_sensor_data: bool,
}

impl MonitorLoop {
    pub fn new(stop_timeout: Duration, show_sensor_data: bool) -> Self {
        Self {
            task: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
            stop_timeout,
            show_sensor_data,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub async fn start(&self, connection: &ConnectionManager, store: SampleStore) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            if !task.handle.is_finished() {
                return Ok(());
            }
            warn!("previous monitor task exited on its own; starting a new one");
        }

        let transport = match connection.transport().await {
            Ok(t) => t,
            Err(e) => {
                error!("cannot start monitoring - not connected");
                return Err(e);
            }
        };
        let interval = connection.poll_interval();
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(transport, store, interval, stop_rx, self.show_sensor_data));

        let task = MonitorTask { stop_tx, handle };
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        info!(interval_ms = interval.as_millis() as u64, "started continuous monitoring");
        Ok(())
    }

    /// idempotent; returns once the task has exited or the stop timeout passed
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };

        // receiver may already be gone if the task died; that's fine
        let _ = task.stop_tx.send(true);

        let mut handle = task.handle;
        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => info!("stopped continuous monitoring"),
            Ok(Err(e)) => warn!(error = %e, "monitor task ended abnormally"),
            Err(_) => {
                error!(
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "monitor task did not exit in time; abandoning it \
                     (a device read may still be in flight)"
                );
                handle.abort();
            }
        }
    }
}

async fn run(
    transport: SharedTransport,
    store: SampleStore,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    show_sensor_data: bool,
) {
    debug!("monitor task running");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        match transport.read().await {
            Ok(reading) => {
                if show_sensor_data {
                    debug!(
                        gas = reading.gas_concentration,
                        gas_alert = reading.gas_alert,
                        water_cm = reading.water_level_cm,
                        actuator = reading.actuator_position,
                        "sample"
                    );
                }
                store.record(reading).await;
            }
            Err(e) if e.is_transient() => warn!(error = %e, "poll failed; retrying next cycle"),
            Err(e) => warn!(error = %e, "unexpected poll error; retrying next cycle"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            // fires on stop, or when the sender is dropped
            _ = stop_rx.changed() => break,
        }
    }

    debug!("monitor task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelInfo, Provenance, SensorReading};
    use crate::error::TelemetryError;
    use crate::transport::{timestamp_ms, Transport, TransportProvider};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// every third read fails, the rest succeed
    struct Flaky {
        calls: Arc<AtomicU32>,
    }

    impl Transport for Flaky {
        fn acquire(&mut self) -> Result<SensorReading> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n % 3 == 0 {
                return Err(TelemetryError::ReadFailure("checksum".into()));
            }
            Ok(SensorReading {
                gas_concentration: n,
                gas_alert: false,
                water_level_cm: 25.0,
                actuator_position: 90,
                timestamp_ms: timestamp_ms(),
                provenance: Provenance::Synthetic,
                status: "test".into(),
            })
        }
    }

    struct FlakyProvider {
        calls: Arc<AtomicU32>,
        interval: Duration,
    }

    impl TransportProvider for FlakyProvider {
        fn provenance(&self) -> Provenance {
            Provenance::Synthetic
        }

        fn list_channels(&self) -> Vec<ChannelInfo> {
            Vec::new()
        }

        fn discover(&self) -> Result<String> {
            Ok("flaky".into())
        }

        fn open(&self, _channel: &str) -> Result<Box<dyn Transport>> {
            Ok(Box::new(Flaky {
                calls: self.calls.clone(),
            }))
        }

        fn poll_interval(&self) -> Duration {
            self.interval
        }
    }

    fn setup(interval: Duration) -> (ConnectionManager, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = FlakyProvider {
            calls: calls.clone(),
            interval,
        };
        (ConnectionManager::new(Arc::new(provider)), calls)
    }

    #[tokio::test]
    async fn test_start_requires_connection() {
        let (connection, _) = setup(Duration::from_millis(20));
        let monitor = MonitorLoop::new(DEFAULT_STOP_TIMEOUT, false);
        let err = monitor.start(&connection, SampleStore::new(10)).await.unwrap_err();
        assert_eq!(err, TelemetryError::NotConnected);
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_failed_polls_do_not_end_the_loop() {
        let (connection, calls) = setup(Duration::from_millis(10));
        connection.connect(None).await.unwrap();
        let monitor = MonitorLoop::new(DEFAULT_STOP_TIMEOUT, true);
        let store = SampleStore::new(100);

        monitor.start(&connection, store.clone()).await.unwrap();
        while calls.load(Ordering::SeqCst) < 7 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(monitor.is_running());
        monitor.stop().await;
        assert!(!monitor.is_running());

        let total = calls.load(Ordering::SeqCst);
        let failures = total / 3;
        assert_eq!(store.len().await as u32, total - failures);
        // every stored reading is one of the successful calls
        assert!(store
            .snapshot(None)
            .await
            .iter()
            .all(|r| r.gas_concentration % 3 != 0));
    }

    #[tokio::test]
    async fn test_start_twice_spawns_one_task() {
        // each task polls once immediately, then sleeps for an hour
        let (connection, calls) = setup(Duration::from_secs(3600));
        connection.connect(None).await.unwrap();
        let monitor = MonitorLoop::new(DEFAULT_STOP_TIMEOUT, false);
        let store = SampleStore::new(10);

        monitor.start(&connection, store.clone()).await.unwrap();
        monitor.start(&connection, store.clone()).await.unwrap();
        monitor.start(&connection, store.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await, 1);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (connection, calls) = setup(Duration::from_millis(10));
        let monitor = MonitorLoop::new(DEFAULT_STOP_TIMEOUT, false);
        monitor.stop().await;

        connection.connect(None).await.unwrap();
        monitor.start(&connection, SampleStore::new(10)).await.unwrap();
        monitor.stop().await;
        monitor.stop().await;

        // no polls after stop returns
        let after_stop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn test_stop_wakes_a_sleeping_loop_promptly() {
        let (connection, _) = setup(Duration::from_secs(3600));
        connection.connect(None).await.unwrap();
        let monitor = MonitorLoop::new(DEFAULT_STOP_TIMEOUT, false);
        monitor.start(&connection, SampleStore::new(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        monitor.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    struct Stuck;

    impl Transport for Stuck {
        fn acquire(&mut self) -> Result<SensorReading> {
            std::thread::sleep(Duration::from_millis(400));
            Err(TelemetryError::NoData)
        }
    }

    struct StuckProvider;

    impl TransportProvider for StuckProvider {
        fn provenance(&self) -> Provenance {
            Provenance::Real
        }

        fn list_channels(&self) -> Vec<ChannelInfo> {
            Vec::new()
        }

        fn discover(&self) -> Result<String> {
            Ok("stuck".into())
        }

        fn open(&self, _channel: &str) -> Result<Box<dyn Transport>> {
            Ok(Box::new(Stuck))
        }

        fn poll_interval(&self) -> Duration {
            Duration::from_millis(10)
        }
    }

    #[tokio::test]
    async fn test_stop_gives_up_after_timeout() {
        let connection = ConnectionManager::new(Arc::new(StuckProvider));
        connection.connect(None).await.unwrap();
        let monitor = MonitorLoop::new(Duration::from_millis(50), false);
        monitor.start(&connection, SampleStore::new(10)).await.unwrap();
        // let the first read begin
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        monitor.stop().await;
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(!monitor.is_running());
    }
}
