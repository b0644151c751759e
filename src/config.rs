use dotenvy::dotenv;
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_address: IpAddr,
    pub http_port: u16,
    pub env_file_path: PathBuf,
    pub config_url: String,
    pub config_fetch_attempts: usize,
    pub config_retry_interval_ms: u64,

    pub mqtt_reconnect_period_ms: u64,
    pub mqtt_keep_alive_secs: u64,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, SettingsError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| SettingsError::MissingOrInvalid(key.to_string())),
        None => Ok(default),
    }
}

impl Config {
    /// Validate timeout values and other critical configurations.
    fn validate_timeouts(&self) -> Result<(), SettingsError> {
        const MIN_TIMEOUT: u64 = 100;
        const MAX_TIMEOUT: u64 = 1_000_000;

        if self.mqtt_reconnect_period_ms != 0
            && !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&self.mqtt_reconnect_period_ms)
        {
            return Err(SettingsError::ParsingError(format!(
                "MQTT_RECONNECT_PERIOD_MS must be 0 or between {} and {} ms",
                MIN_TIMEOUT, MAX_TIMEOUT
            )));
        }

        if self.mqtt_keep_alive_secs == 0 {
            return Err(SettingsError::ParsingError(
                "MQTT_KEEP_ALIVE_SECS must be at least 1".to_string(),
            ));
        }

        if self.config_fetch_attempts == 0 {
            return Err(SettingsError::ParsingError(
                "DASHBOARD_CONFIG_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        dotenv().ok(); // Load environment variables from .env file
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let http_address = parse_or(&lookup, "DASHBOARD_HTTP_ADDRESS", IpAddr::from([127, 0, 0, 1]))?;
        let http_port = parse_or(&lookup, "DASHBOARD_HTTP_PORT", 8000u16)?;

        let config = Self {
            http_address,
            http_port,
            env_file_path: lookup("DASHBOARD_ENV_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".env")),
            config_url: lookup("DASHBOARD_CONFIG_URL")
                .unwrap_or_else(|| format!("http://{}:{}/mqtt-config", http_address, http_port)),
            config_fetch_attempts: parse_or(&lookup, "DASHBOARD_CONFIG_ATTEMPTS", 5usize)?,
            config_retry_interval_ms: parse_or(&lookup, "DASHBOARD_CONFIG_RETRY_MS", 500u64)?,

            mqtt_reconnect_period_ms: parse_or(&lookup, "MQTT_RECONNECT_PERIOD_MS", 2000u64)?,
            mqtt_keep_alive_secs: parse_or(&lookup, "MQTT_KEEP_ALIVE_SECS", 30u64)?,
        };

        // Validate timeouts after constructing the configuration
        config.validate_timeouts()?;

        Ok(config)
    }

    /// `None` when automatic reconnects are disabled.
    pub fn reconnect_period(&self) -> Option<Duration> {
        (self.mqtt_reconnect_period_ms > 0).then(|| Duration::from_millis(self.mqtt_reconnect_period_ms))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_secs)
    }
}
