use serde::Serialize;
use time::OffsetDateTime;

/// Broker connection parameters, immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub broker_url: String,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// One parsed temperature, timestamped at arrival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: OffsetDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }

    pub fn now(value: f64) -> Self {
        Self::new(OffsetDateTime::now_utc(), value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Error,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusStyle {
    #[default]
    Default,
    Connected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub text: String,
}
