//! ==============================================================================
//! controller.rs - the telemetry controller facade
//! ==============================================================================
//!
//! purpose:
//!     the single object callers talk to. owns the connection, the monitor
//!     task, the sample store and the thresholds, and exposes the operations
//!     a web layer or the demo binary needs:
//!
//!         connect / disconnect / shutdown
//!         start_monitoring / stop_monitoring
//!         status / read_now / current / history
//!         active_alerts / analytics
//!         thresholds / set_thresholds / list_channels
//!
//!     every operation takes `&self`; share the controller with an `Arc`.
//!     operations that change what the monitor polls (connect, disconnect,
//!     start/stop monitoring) are serialized by one lifecycle lock, so a
//!     start can never pick up a transport that is about to be released.
//!
//! relationships:
//!     - builds: synthetic.rs or serial.rs provider (chosen once, from config)
//!     - owns: connection.rs, monitor.rs, history.rs, thresholds.rs
//!     - derives: alerts.rs, analytics.rs (on demand, from snapshots)
//!
//! ==============================================================================

use crate::alerts;
use crate::analytics::{self, Analytics};
use crate::config::HostConfig;
use crate::connection::ConnectionManager;
use crate::domain::{AlertEvent, ChannelInfo, Provenance, SensorReading, SystemStatus, Thresholds};
use crate::error::Result;
use crate::history::{SampleStore, DEFAULT_CAPACITY};
use crate::monitor::{MonitorLoop, DEFAULT_STOP_TIMEOUT};
use crate::serial::SerialProvider;
use crate::synthetic::SyntheticProvider;
use crate::thresholds::ThresholdStore;
use crate::transport::{MonotonicClock, TransportProvider};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// readings seeded into an empty history on first connect
pub const DEFAULT_BACKFILL: usize = 20;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub history_capacity: usize,
    pub stop_timeout: Duration,
    pub show_sensor_data: bool,
    pub backfill: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_CAPACITY,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            show_sensor_data: false,
            backfill: DEFAULT_BACKFILL,
        }
    }
}

impl ControllerOptions {
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            history_capacity: config.history.capacity,
            stop_timeout: config.stop_timeout(),
            show_sensor_data: config.logging.show_sensor_data,
            backfill: DEFAULT_BACKFILL,
        }
    }
}

pub struct Controller {
    connection: ConnectionManager,
    monitor: MonitorLoop,
    samples: SampleStore,
    thresholds: ThresholdStore,
    backfill: usize,
    lifecycle: Mutex<()>,
}

impl Controller {
    /// build the controller for the transport the config selects
    pub fn new(config: &HostConfig) -> Self {
        let clock = Arc::new(MonotonicClock::new());
        let thresholds = ThresholdStore::new(config.thresholds());

        let provider: Arc<dyn TransportProvider> = if config.device.simulate {
            Arc::new(SyntheticProvider::new(
                thresholds.clone(),
                clock,
                config.synthetic_interval(),
            ))
        } else {
            Arc::new(SerialProvider::new(config.serial_settings(), clock))
        };

        Self::with_provider(provider, thresholds, ControllerOptions::from_config(config))
    }

    /// build around an existing provider; `thresholds` should be the same
    /// store the provider reads, if it reads one
    pub fn with_provider(
        provider: Arc<dyn TransportProvider>,
        thresholds: ThresholdStore,
        options: ControllerOptions,
    ) -> Self {
        info!(mode = ?provider.provenance(), "controller created");
        Self {
            connection: ConnectionManager::new(provider),
            monitor: MonitorLoop::new(options.stop_timeout, options.show_sensor_data),
            samples: SampleStore::new(options.history_capacity),
            thresholds,
            backfill: options.backfill,
            lifecycle: Mutex::new(()),
        }
    }

    // ==========================================================================
    // connection
    // ==========================================================================

    /// connect to `hint`, the last channel used, or a discovered one.
    ///
    /// already connected to the same channel: no-op. a different channel:
    /// monitoring is stopped and the old transport closed first.
    pub async fn connect(&self, hint: Option<&str>) -> Result<String> {
        let _lifecycle = self.lifecycle.lock().await;

        if let Some(current) = self.connection.connected_channel().await {
            if hint.map_or(true, |h| h == current) {
                return Ok(current);
            }
            info!(from = %current, to = ?hint, "switching channel");
        }

        // the monitor may still hold a previous transport
        self.monitor.stop().await;
        let channel = self.connection.connect(hint).await?;

        if self.backfill > 0 && self.samples.is_empty().await {
            let seed = self.connection.provider().backfill(self.backfill);
            let count = seed.len();
            if count > 0 && self.samples.backfill(seed).await {
                info!(count, "seeded history");
            }
        }

        Ok(channel)
    }

    /// stop monitoring and release the transport; always succeeds
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.release().await;
    }

    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        info!("shutting down controller");
        self.release().await;
    }

    /// monitor first, so no poll runs against a released transport
    async fn release(&self) {
        self.monitor.stop().await;
        self.connection.close().await;
    }

    pub fn list_channels(&self) -> Vec<ChannelInfo> {
        self.connection.list_channels()
    }

    pub fn mode(&self) -> Provenance {
        self.connection.provenance()
    }

    // ==========================================================================
    // monitoring
    // ==========================================================================

    pub async fn start_monitoring(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.monitor.start(&self.connection, self.samples.clone()).await
    }

    pub async fn stop_monitoring(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        self.monitor.stop().await;
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    // ==========================================================================
    // data
    // ==========================================================================

    /// one reading straight from the device; updates the latest slot only.
    ///
    /// bounded by one device read window: if the monitor has a read in
    /// flight, its outcome is returned instead of queueing a second read.
    pub async fn read_now(&self) -> Result<SensorReading> {
        let transport = self.connection.transport().await?;
        let reading = transport.read_or_join().await?;
        self.samples.set_latest(reading.clone()).await;
        Ok(reading)
    }

    /// last known reading, no I/O
    pub async fn current(&self) -> Option<SensorReading> {
        self.samples.latest().await
    }

    /// the most recent `limit` readings (all when `None`), oldest first
    pub async fn history(&self, limit: Option<usize>) -> Vec<SensorReading> {
        self.samples.snapshot(limit).await
    }

    pub async fn status(&self) -> SystemStatus {
        let (samples_retained, last_sample_ms) = self.samples.summary().await;
        SystemStatus {
            connection: self.connection.state().await,
            channel: self.connection.channel().await,
            monitoring: self.monitor.is_running(),
            mode: self.connection.provenance(),
            samples_retained,
            last_sample_ms,
            thresholds: self.thresholds.get(),
        }
    }

    pub async fn active_alerts(&self) -> Vec<AlertEvent> {
        let latest = self.samples.latest().await;
        alerts::evaluate(latest.as_ref(), &self.thresholds.get())
    }

    pub async fn analytics(&self) -> Analytics {
        let history = self.samples.snapshot(None).await;
        analytics::compute(&history, self.connection.poll_interval(), self.mode())
    }

    // ==========================================================================
    // thresholds
    // ==========================================================================

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds.get()
    }

    /// update either or both thresholds; returns the values now in effect
    pub fn set_thresholds(
        &self,
        gas: Option<u32>,
        water_critical_cm: Option<f64>,
    ) -> Result<Thresholds> {
        self.thresholds.set(gas, water_critical_cm)
    }
}
