use crate::models::BrokerConfig;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not fetch broker config from {url}: {reason}")]
    FetchFailed { url: String, reason: String },
    #[error("{0}")]
    ServerReported(String),
    #[error("missing broker settings: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

impl ConfigError {
    /// Only transport-level failures are worth asking again for.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConfigError::FetchFailed { .. })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    broker_url: Option<String>,
    topic: Option<String>,
    username: Option<String>,
    password: Option<String>,
    error: Option<String>,
    #[serde(default)]
    missing: Vec<String>,
}

/// Fetches the broker settings from the config endpoint. Never retries.
pub async fn load_config(http: &reqwest::Client, url: &str) -> Result<BrokerConfig, ConfigError> {
    let fetch_failed = |reason: String| ConfigError::FetchFailed {
        url: url.to_string(),
        reason,
    };

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| fetch_failed(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| fetch_failed(e.to_string()))?;

    debug!("Config endpoint answered {}", status);
    interpret_response(url, status.as_u16(), &body)
}

/// Turns a config endpoint response into a `BrokerConfig`.
pub fn interpret_response(url: &str, status: u16, body: &str) -> Result<BrokerConfig, ConfigError> {
    let success = (200..300).contains(&status);
    let response: ConfigResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => {
            let reason = if success {
                format!("invalid JSON body: {}", e)
            } else {
                format!("HTTP status {}", status)
            };
            return Err(ConfigError::FetchFailed {
                url: url.to_string(),
                reason,
            });
        }
    };

    if let Some(message) = response.error {
        return Err(if response.missing.is_empty() {
            ConfigError::ServerReported(message)
        } else {
            ConfigError::MissingFields(response.missing)
        });
    }
    if !success {
        return Err(ConfigError::FetchFailed {
            url: url.to_string(),
            reason: format!("HTTP status {}", status),
        });
    }

    let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
    let broker_url = non_empty(response.broker_url);
    let topic = non_empty(response.topic);

    match (broker_url, topic) {
        (Some(broker_url), Some(topic)) => Ok(BrokerConfig {
            broker_url,
            topic,
            username: non_empty(response.username),
            password: non_empty(response.password),
        }),
        (broker_url, topic) => {
            let mut missing = Vec::new();
            if broker_url.is_none() {
                missing.push("brokerUrl".to_string());
            }
            if topic.is_none() {
                missing.push("topic".to_string());
            }
            Err(ConfigError::MissingFields(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://127.0.0.1:8000/mqtt-config";

    #[test]
    fn test_successful_response() {
        let body = r#"{"brokerUrl":"wss://broker:8884/mqtt","username":"","password":"","topic":"sensors/tc74"}"#;
        let config = interpret_response(URL, 200, body).unwrap();

        assert_eq!(config.broker_url, "wss://broker:8884/mqtt");
        assert_eq!(config.topic, "sensors/tc74");
        assert_eq!(config.username, None);
        assert_eq!(config.password, None);
    }

    #[test]
    fn test_credentials_are_kept() {
        let body = r#"{"brokerUrl":"mqtt://b","username":"u","password":"p","topic":"t"}"#;
        let config = interpret_response(URL, 200, body).unwrap();
        assert_eq!(config.username.as_deref(), Some("u"));
        assert_eq!(config.password.as_deref(), Some("p"));
    }

    #[test]
    fn test_server_reported_error() {
        let err = interpret_response(URL, 500, r#"{"error":".env file not found"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ServerReported(ref m) if m == ".env file not found"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_missing_fields_from_server() {
        let body = r#"{"error":"MQTT_BROKER_URL and MQTT_TOPIC must be set in .env","missing":["MQTT_TOPIC"]}"#;
        let err = interpret_response(URL, 500, body).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFields(ref f) if f == &vec!["MQTT_TOPIC".to_string()]));
    }

    #[test]
    fn test_missing_fields_in_success_body() {
        let body = r#"{"brokerUrl":"","username":"","password":"","topic":"t"}"#;
        let err = interpret_response(URL, 200, body).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFields(ref f) if f == &vec!["brokerUrl".to_string()]));

        let err = interpret_response(URL, 200, "{}").unwrap_err();
        assert_eq!(err.to_string(), "missing broker settings: brokerUrl, topic");
    }

    #[test]
    fn test_unusable_responses_are_fetch_failures() {
        let err = interpret_response(URL, 502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(err.is_transient());

        let err = interpret_response(URL, 404, "{}").unwrap_err();
        assert!(matches!(err, ConfigError::FetchFailed { .. }));

        let err = interpret_response(URL, 200, "not json").unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fetch_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/mqtt-config", listener.local_addr().unwrap());
        drop(listener);

        let err = load_config(&reqwest::Client::new(), &url).await.unwrap_err();
        assert!(matches!(err, ConfigError::FetchFailed { url: ref u, .. } if u == &url));
        assert!(err.is_transient());
    }
}
