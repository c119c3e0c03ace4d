//! ==============================================================================
//! connection.rs - transport lifecycle
//! ==============================================================================
//!
//! purpose:
//!     owns the open transport and the connection state machine:
//!
//!         Disconnected --connect--> Connecting --ok--> Connected
//!                                        \----fail--> ConnectFailed(reason)
//!         Connected --close--> Disconnected
//!
//!     connect/close calls are serialized by a lifecycle mutex. the session
//!     (state, channel, transport) sits behind its own lock that is never held
//!     across device I/O or the settle delay, so status queries stay instant
//!     while a connect is in progress.
//!
//! relationships:
//!     - uses: transport.rs (TransportProvider::discover/open)
//!     - used by: controller.rs, monitor.rs (borrows the open transport)
//!
//! ==============================================================================

use crate::domain::{ChannelInfo, ConnectionState, Provenance};
use crate::error::{Result, TelemetryError};
use crate::transport::{SharedTransport, TransportProvider};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

struct Session {
    state: ConnectionState,
    /// last channel used; remembered across disconnects
    channel: Option<String>,
    transport: Option<SharedTransport>,
}

pub struct ConnectionManager {
    provider: Arc<dyn TransportProvider>,
    session: RwLock<Session>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl ConnectionManager {
    pub fn new(provider: Arc<dyn TransportProvider>) -> Self {
        Self {
            provider,
            session: RwLock::new(Session {
                state: ConnectionState::Disconnected,
                channel: None,
                transport: None,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// open a channel: the hint if given, else the last channel used, else
    /// whatever discovery finds. returns the resolved channel id.
    ///
    /// an already open transport is closed first; callers must have stopped
    /// the monitor before reconnecting.
    pub async fn connect(&self, hint: Option<&str>) -> Result<String> {
        let _lifecycle = self.lifecycle.lock().await;

        let remembered = {
            let mut session = self.session.write().await;
            session.transport = None;
            session.state = ConnectionState::Connecting;
            session.channel.clone()
        };

        let channel = match hint.map(str::to_owned).or(remembered) {
            Some(channel) => channel,
            None => match self.provider.discover() {
                Ok(channel) => channel,
                Err(e) => return Err(self.fail(None, e).await),
            },
        };

        info!(channel = %channel, "connecting");

        let provider = self.provider.clone();
        let target = channel.clone();
        let opened = tokio::task::spawn_blocking(move || provider.open(&target))
            .await
            .unwrap_or_else(|e| {
                Err(TelemetryError::ConnectFailure {
                    channel: channel.clone(),
                    reason: format!("open task failed: {}", e),
                })
            });

        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail(Some(channel), e).await),
        };

        // hardware initialization grace period (boards reset when the port opens)
        let settle = self.provider.settle_delay();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let mut session = self.session.write().await;
        session.state = ConnectionState::Connected;
        session.channel = Some(channel.clone());
        session.transport = Some(SharedTransport::new(transport, self.provider.read_timeout()));
        info!(channel = %channel, mode = ?self.provider.provenance(), "connected");
        Ok(channel)
    }

    async fn fail(&self, channel: Option<String>, e: TelemetryError) -> TelemetryError {
        error!(error = %e, "connection attempt failed");
        let mut session = self.session.write().await;
        session.state = ConnectionState::ConnectFailed(e.to_string());
        if channel.is_some() {
            session.channel = channel;
        }
        e
    }

    /// release the transport; always succeeds
    pub async fn close(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let mut session = self.session.write().await;
        let was_connected = session.transport.take().is_some();
        session.state = ConnectionState::Disconnected;
        if was_connected {
            info!(channel = ?session.channel, "disconnected");
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.session.read().await.state.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.session.read().await.state.is_connected()
    }

    pub async fn channel(&self) -> Option<String> {
        self.session.read().await.channel.clone()
    }

    /// the channel id, only while connected
    pub async fn connected_channel(&self) -> Option<String> {
        let session = self.session.read().await;
        if session.state.is_connected() {
            session.channel.clone()
        } else {
            None
        }
    }

    /// the open transport, or `NotConnected`
    pub async fn transport(&self) -> Result<SharedTransport> {
        self.session
            .read()
            .await
            .transport
            .clone()
            .ok_or(TelemetryError::NotConnected)
    }

    pub fn provider(&self) -> &Arc<dyn TransportProvider> {
        &self.provider
    }

    pub fn provenance(&self) -> Provenance {
        self.provider.provenance()
    }

    pub fn poll_interval(&self) -> Duration {
        self.provider.poll_interval()
    }

    pub fn list_channels(&self) -> Vec<ChannelInfo> {
        self.provider.list_channels()
    }
}
