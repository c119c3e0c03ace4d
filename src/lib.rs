//! ==============================================================================
//! lib.rs - telemetry host controller
//! ==============================================================================
//!
//! purpose:
//!     controller for one gas / water-level sensor board, real (serial) or
//!     simulated. polls in the background, keeps a bounded history, derives
//!     alerts and analytics on demand.
//!
//! layout:
//!     domain / error        shared types and the error taxonomy
//!     transport             the read capability + blocking-pool helper
//!     serial / synthetic    the two transport variants
//!     connection            connect/close state machine
//!     history / thresholds  shared state
//!     monitor               background polling task
//!     alerts / analytics    pure derivations
//!     controller            the facade
//!     config                host.toml
//!
//! ==============================================================================

pub mod alerts;
pub mod analytics;
pub mod config;
pub mod connection;
pub mod controller;
pub mod domain;
pub mod error;
pub mod history;
pub mod monitor;
pub mod serial;
pub mod synthetic;
pub mod thresholds;
pub mod transport;

pub use analytics::{Analytics, AnalyticsSummary, Trend};
pub use config::HostConfig;
pub use controller::{Controller, ControllerOptions};
pub use domain::{
    AlertEvent, AlertKind, ChannelInfo, ConnectionState, Provenance, SensorReading, Severity,
    SystemStatus, Thresholds,
};
pub use error::{Result, TelemetryError};
pub use thresholds::ThresholdStore;
pub use transport::{MonotonicClock, Transport, TransportProvider};
