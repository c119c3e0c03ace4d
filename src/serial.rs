//! ==============================================================================
//! serial.rs - real sensor board over a serial line
//! ==============================================================================
//!
//! purpose:
//!     talks to the sensor board (an arduino-class microcontroller) over a
//!     serial port. the board prints one JSON object per line:
//!
//!         {"h2_conc": 87, "h2_alert": 0, "water_cm": 23.5, "servo_pos": 90}
//!
//! read cycle:
//!     1. flush whatever is sitting in the input queue (stale samples)
//!     2. collect bytes until a full line arrives or the read window closes
//!     3. malformed lines are dropped and the next line is tried
//!     4. window closed with nothing at all   -> NoData
//!        window closed with only bad lines   -> ReadFailure(last problem)
//!
//! discovery:
//!     scans /dev/serial/by-id (descriptive names such as
//!     "usb-Arduino__www.arduino.cc__0043_...") plus any bare ttyACM/ttyUSB
//!     nodes, and picks the first whose description contains one of the
//!     configured vendor signatures (case-insensitive).
//!
//! relationships:
//!     - implements: transport.rs (Transport, TransportProvider)
//!     - uses: rppal::uart (on feature="hardware")
//!
//! ==============================================================================

use crate::domain::{ChannelInfo, Provenance, SensorReading};
use crate::error::{Result, TelemetryError};
use crate::transport::{MonotonicClock, Transport, TransportProvider};

use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_SIGNATURES: [&str; 3] = ["arduino", "ch340", "usb"];

const BY_ID_DIR: &str = "/dev/serial/by-id";
const DEV_DIR: &str = "/dev";
const SYS_TTY_DIR: &str = "/sys/class/tty";

/// pause when the link has nothing for us, so a link without a read timeout
/// doesn't spin
const IDLE_BACKOFF: Duration = Duration::from_millis(20);

/// refuse to buffer an endless line from a misbehaving board
const MAX_LINE_BYTES: usize = 4096;

// ==============================================================================
// wire format
// ==============================================================================

/// one line as printed by the board
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceFrame {
    pub h2_conc: u32,
    pub h2_alert: u8,
    pub water_cm: f64,
    pub servo_pos: i32,
}

/// decode one line; the frame must be a `{ ... }` object
pub fn parse_line(line: &str) -> Result<DeviceFrame> {
    let line = line.trim();
    if !(line.starts_with('{') && line.ends_with('}')) {
        return Err(TelemetryError::ReadFailure(format!(
            "missing frame delimiters: {:?}",
            truncate(line, 64)
        )));
    }
    serde_json::from_str(line).map_err(|e| {
        TelemetryError::ReadFailure(format!("bad frame: {} (got: {})", e, truncate(line, 64)))
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ==============================================================================
// byte link
// ==============================================================================

/// the minimal byte pipe a serial read needs
pub trait SerialLink: Send {
    /// discard anything waiting in the input queue
    fn clear_input(&mut self) -> io::Result<()>;

    /// read whatever is available; `Ok(0)` means nothing arrived within the
    /// link's own short timeout
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// splits a byte stream into lines and decodes frames within a time window
pub struct LineReader<L> {
    link: L,
    pending: Vec<u8>,
}

impl<L: SerialLink> LineReader<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            pending: Vec::new(),
        }
    }

    pub fn next_frame(&mut self, window: Duration) -> Result<DeviceFrame> {
        self.link
            .clear_input()
            .map_err(|e| TelemetryError::ReadFailure(format!("flush failed: {}", e)))?;
        self.pending.clear();

        let deadline = Instant::now() + window;
        let mut last_problem: Option<TelemetryError> = None;
        let mut chunk = [0u8; 256];

        while Instant::now() < deadline {
            let n = match self.link.read_chunk(&mut chunk) {
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    0
                }
                Err(e) => return Err(TelemetryError::ReadFailure(format!("channel error: {}", e))),
            };

            if n == 0 {
                std::thread::sleep(IDLE_BACKOFF);
                continue;
            }
            self.pending.extend_from_slice(&chunk[..n]);

            while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = match std::str::from_utf8(&raw) {
                    Ok(line) => line.trim(),
                    Err(e) => {
                        let detail = format!("invalid utf-8: {}", e);
                        last_problem = Some(TelemetryError::ReadFailure(detail));
                        continue;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                match parse_line(line) {
                    Ok(frame) => return Ok(frame),
                    Err(e) => {
                        debug!(error = %e, "discarding malformed line");
                        last_problem = Some(e);
                    }
                }
            }

            if self.pending.len() > MAX_LINE_BYTES {
                self.pending.clear();
                last_problem = Some(TelemetryError::ReadFailure(format!(
                    "line exceeded {} bytes without a newline",
                    MAX_LINE_BYTES
                )));
            }
        }

        Err(last_problem.unwrap_or(TelemetryError::NoData))
    }
}

// ==============================================================================
// transport
// ==============================================================================

pub struct SerialTransport<L> {
    reader: LineReader<L>,
    clock: Arc<MonotonicClock>,
    read_timeout: Duration,
}

impl<L: SerialLink> SerialTransport<L> {
    pub fn new(link: L, clock: Arc<MonotonicClock>, read_timeout: Duration) -> Self {
        Self {
            reader: LineReader::new(link),
            clock,
            read_timeout,
        }
    }
}

impl<L: SerialLink> Transport for SerialTransport<L> {
    fn acquire(&mut self) -> Result<SensorReading> {
        let frame = self.reader.next_frame(self.read_timeout)?;
        Ok(SensorReading {
            gas_concentration: frame.h2_conc,
            // the board's own flag is authoritative for real hardware
            gas_alert: frame.h2_alert != 0,
            water_level_cm: frame.water_cm,
            actuator_position: frame.servo_pos,
            timestamp_ms: self.clock.now_ms(),
            provenance: Provenance::Real,
            status: "connected".to_string(),
        })
    }
}

// ==============================================================================
// uart link (raspberry pi / linux)
// ==============================================================================

#[cfg(feature = "hardware")]
mod uart {
    use super::SerialLink;
    use rppal::uart::{Parity, Queue, Uart};
    use std::io;
    use std::time::Duration;

    pub struct UartLink(Uart);

    impl UartLink {
        pub fn open(path: &str, baud_rate: u32) -> rppal::uart::Result<Self> {
            let mut uart = Uart::with_path(path, baud_rate, Parity::None, 8, 1)?;
            // return after 100ms even if nothing arrived
            uart.set_read_mode(0, Duration::from_millis(100))?;
            Ok(Self(uart))
        }
    }

    impl SerialLink for UartLink {
        fn clear_input(&mut self) -> io::Result<()> {
            self.0.flush(Queue::Input).map_err(|e| io::Error::other(e.to_string()))
        }

        fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf).map_err(|e| io::Error::other(e.to_string()))
        }
    }
}

// ==============================================================================
// provider
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub signatures: Vec<String>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll_interval: Duration::from_secs(5),
            signatures: DEFAULT_SIGNATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct SerialProvider {
    settings: SerialSettings,
    #[cfg_attr(not(feature = "hardware"), allow(dead_code))]
    clock: Arc<MonotonicClock>,
    by_id_dir: PathBuf,
    dev_dir: PathBuf,
}

impl SerialProvider {
    pub fn new(settings: SerialSettings, clock: Arc<MonotonicClock>) -> Self {
        Self {
            settings,
            clock,
            by_id_dir: PathBuf::from(BY_ID_DIR),
            dev_dir: PathBuf::from(DEV_DIR),
        }
    }

    /// scan alternative directories instead of the real /dev tree
    pub fn with_scan_dirs(
        mut self,
        by_id_dir: impl Into<PathBuf>,
        dev_dir: impl Into<PathBuf>,
    ) -> Self {
        self.by_id_dir = by_id_dir.into();
        self.dev_dir = dev_dir.into();
        self
    }
}

impl TransportProvider for SerialProvider {
    fn provenance(&self) -> Provenance {
        Provenance::Real
    }

    fn list_channels(&self) -> Vec<ChannelInfo> {
        scan_channels(&self.by_id_dir, &self.dev_dir)
    }

    fn discover(&self) -> Result<String> {
        let channels = self.list_channels();
        let found = select_channel(&channels, &self.settings.signatures)
            .map(|c| c.id.clone())
            .ok_or(TelemetryError::DiscoveryFailure)?;
        info!(channel = %found, "auto-detected sensor board");
        Ok(found)
    }

    #[cfg(feature = "hardware")]
    fn open(&self, channel: &str) -> Result<Box<dyn Transport>> {
        let link = uart::UartLink::open(channel, self.settings.baud_rate).map_err(|e| {
            TelemetryError::ConnectFailure {
                channel: channel.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Box::new(SerialTransport::new(
            link,
            self.clock.clone(),
            self.settings.read_timeout,
        )))
    }

    #[cfg(not(feature = "hardware"))]
    fn open(&self, channel: &str) -> Result<Box<dyn Transport>> {
        Err(TelemetryError::ConnectFailure {
            channel: channel.to_string(),
            reason: "serial support not compiled in (enable the `hardware` feature)".to_string(),
        })
    }

    fn settle_delay(&self) -> Duration {
        self.settings.settle_delay
    }

    fn poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }

    fn read_timeout(&self) -> Duration {
        self.settings.read_timeout
    }
}

// ==============================================================================
// discovery
// ==============================================================================

/// first channel whose description contains any signature, ignoring case
pub fn select_channel<'a>(
    channels: &'a [ChannelInfo],
    signatures: &[String],
) -> Option<&'a ChannelInfo> {
    let signatures: Vec<String> = signatures.iter().map(|s| s.to_lowercase()).collect();
    channels.iter().find(|c| {
        let description = c.description.to_lowercase();
        signatures.iter().any(|sig| !sig.is_empty() && description.contains(sig.as_str()))
    })
}

/// enumerate serial channels
///
/// entries in `by_id_dir` are symlinks whose names describe the device;
/// they resolve to the node in `dev_dir`. bare ttyACM*/ttyUSB* nodes that
/// have no by-id alias are listed with whatever sysfs knows about them.
pub fn scan_channels(by_id_dir: &Path, dev_dir: &Path) -> Vec<ChannelInfo> {
    let mut channels = Vec::new();

    if let Ok(entries) = std::fs::read_dir(by_id_dir) {
        let mut named: Vec<_> = entries.flatten().collect();
        named.sort_by_key(|e| e.file_name());
        for entry in named {
            let description = entry.file_name().to_string_lossy().into_owned();
            let id = std::fs::canonicalize(entry.path())
                .unwrap_or_else(|_| entry.path())
                .to_string_lossy()
                .into_owned();
            channels.push(ChannelInfo { id, description });
        }
    }

    if let Ok(entries) = std::fs::read_dir(dev_dir) {
        let mut nodes: Vec<_> = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("ttyACM") || name.starts_with("ttyUSB"))
            .collect();
        nodes.sort();
        for name in nodes {
            let path = dev_dir.join(&name);
            let id = std::fs::canonicalize(&path)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();
            if channels.iter().any(|c| c.id == id) {
                continue;
            }
            let description = sysfs_product(&name).unwrap_or_else(|| "n/a".to_string());
            channels.push(ChannelInfo { id, description });
        }
    }

    channels
}

fn sysfs_product(tty: &str) -> Option<String> {
    // ttyACM: device -> interface, product lives one level up
    let base = Path::new(SYS_TTY_DIR).join(tty).join("device");
    ["../product", "../../product"]
        .iter()
        .find_map(|rel| std::fs::read_to_string(base.join(rel)).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
