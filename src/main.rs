//! ==============================================================================
//! main.rs - telemetry host entry point
//! ==============================================================================
//!
//! purpose:
//!     runs the controller standalone: loads host.toml, builds the serial or
//!     synthetic transport, connects, starts background monitoring and
//!     reports status, alerts and analytics until Ctrl-C.
//!
//! responsibilities:
//!     - load configuration (with env overrides for simulation)
//!     - install the tracing subscriber
//!     - keep trying to connect while the board is absent
//!     - stop the monitor and release the port on shutdown
//!
//! relationships:
//!     - uses: telemetry_host::Controller (everything else goes through it)
//!
//! ==============================================================================

use anyhow::Result;
use std::time::Duration;
use telemetry_host::config::ConfigSource;
use telemetry_host::{Controller, HostConfig};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// how often the status report runs
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    println!("===========================================================");
    println!("  Telemetry Host - gas / water level monitor");
    println!("===========================================================");

    // step 1: configuration
    let (mut config, source) = HostConfig::load_or_default();
    config.apply_env_overrides();

    // step 2: logging (RUST_LOG wins over the config level)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &source {
        ConfigSource::File(path) => info!(path = %path.display(), "loaded configuration"),
        ConfigSource::Fallback { path, error } => {
            warn!(path = %path.display(), %error, "failed to load configuration; using defaults")
        }
        ConfigSource::Defaults => warn!("no config file found; using defaults"),
    }
    config.print_summary();

    // step 3: controller
    let controller = Controller::new(&config);
    for channel in controller.list_channels() {
        info!(id = %channel.id, description = %channel.description, "available channel");
    }

    let hint = config.device.port.clone();
    if connect_and_monitor(&controller, hint.as_deref()).await {
        info!("monitoring started");
    }

    // step 4: report loop until Ctrl-C
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                report(&controller).await;
                if !controller.status().await.connection.is_connected() {
                    connect_and_monitor(&controller, hint.as_deref()).await;
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    // step 5: graceful shutdown
    controller.shutdown().await;
    info!("goodbye");
    Ok(())
}

async fn connect_and_monitor(controller: &Controller, hint: Option<&str>) -> bool {
    if let Err(e) = controller.connect(hint).await {
        warn!(error = %e, "device not available; will retry");
        return false;
    }
    match controller.start_monitoring().await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "failed to start monitoring");
            false
        }
    }
}

async fn report(controller: &Controller) {
    let status = controller.status().await;
    info!(
        connection = ?status.connection,
        channel = ?status.channel,
        monitoring = status.monitoring,
        samples = status.samples_retained,
        "status"
    );

    if let Some(r) = controller.current().await {
        println!(
            "[SENSOR] Gas: {} | Water: {:.1} cm | Servo: {}° | Alert: {}",
            r.gas_concentration,
            r.water_level_cm,
            r.actuator_position,
            if r.gas_alert { "YES" } else { "no" }
        );
    }

    for alert in controller.active_alerts().await {
        warn!(kind = ?alert.kind, severity = ?alert.severity, "{}", alert.message);
    }

    let analytics = controller.analytics().await;
    if let Some(s) = analytics.summary() {
        println!(
            "[STATS] {} points over {:.1} min | avg gas {:.2} (recent {:.2}, {:?})",
            s.data_points, s.time_span_minutes, s.average_gas, s.recent_average_gas, s.trend,
        );
        println!(
            "[STATS] avg water {:.2} cm | alert rate {:.2}% | mode {:?}",
            s.average_water_cm, s.alert_rate_percent, s.mode,
        );
    }
}
