use crate::models::BrokerConfig;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Notifications a broker client reports for one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    Connected,
    MessageReceived { topic: String, payload: Vec<u8> },
    Subscribed,
    SubscribeFailed(String),
    TransportError(String),
    Reconnecting,
    Closed,
}

/// Everything the connection manager reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    Broker { generation: u64, event: BrokerEvent },
    ManualReconnectRequested,
    Shutdown,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid broker URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{0}")]
    Client(String),
}

#[derive(Debug, Error)]
#[error("subscribe to '{topic}' failed: {reason}")]
pub struct SubscribeError {
    pub topic: String,
    pub reason: String,
}

/// Options passed to `BrokerClient::connect`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub clean: bool,
    /// `None` disables automatic reconnects.
    pub reconnect_period: Option<Duration>,
    pub keep_alive: Duration,
}

impl ConnectOptions {
    pub fn new(config: &BrokerConfig, reconnect_period: Option<Duration>, keep_alive: Duration) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            clean: true,
            reconnect_period,
            keep_alive,
        }
    }
}

/// Sending half handed to a broker client; tags every event with the
/// connection generation it belongs to.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<DashboardEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<DashboardEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the manager is gone.
    pub fn send(&self, event: BrokerEvent) -> bool {
        self.tx
            .send(DashboardEvent::Broker {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// A publish/subscribe client able to open connections.
pub trait BrokerClient {
    type Handle: BrokerHandle;

    fn connect(
        &mut self,
        url: &str,
        options: &ConnectOptions,
        events: EventSink,
    ) -> Result<Self::Handle, TransportError>;
}

/// One live connection. Results of a subscribe request that the broker
/// acknowledges later arrive as `Subscribed`/`SubscribeFailed` events.
pub trait BrokerHandle {
    fn subscribe(&mut self, topic: &str) -> Result<(), SubscribeError>;
    fn end(&mut self) -> Result<(), TransportError>;
}
