use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const BROKER_URL_KEY: &str = "MQTT_BROKER_URL";
pub const TOPIC_KEY: &str = "MQTT_TOPIC";
pub const USERNAME_KEY: &str = "MQTT_USERNAME";
pub const PASSWORD_KEY: &str = "MQTT_PASSWORD";

#[derive(Debug, Error)]
pub enum EnvFileError {
    #[error(".env file not found")]
    NotFound(PathBuf),
    #[error("could not read {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
    #[error("MQTT_BROKER_URL and MQTT_TOPIC must be set in .env")]
    MissingKeys(Vec<&'static str>),
}

impl EnvFileError {
    pub fn missing_keys(&self) -> &[&'static str] {
        match self {
            EnvFileError::MissingKeys(keys) => keys,
            _ => &[],
        }
    }
}

/// Broker settings as served by the config endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerSettings {
    pub broker_url: String,
    pub username: String,
    pub password: String,
    pub topic: String,
}

impl BrokerSettings {
    /// Reads the env file at `path`. The file is re-read on every call.
    pub fn from_env_file(path: &Path) -> Result<Self, EnvFileError> {
        let vars = read_env_file(path)?;
        Self::from_vars(&vars)
    }

    fn from_vars(vars: &HashMap<String, String>) -> Result<Self, EnvFileError> {
        let value = |key: &str| vars.get(key).cloned().unwrap_or_default();

        let missing: Vec<&'static str> = [BROKER_URL_KEY, TOPIC_KEY]
            .into_iter()
            .filter(|&key| value(key).is_empty())
            .collect();
        if !missing.is_empty() {
            return Err(EnvFileError::MissingKeys(missing));
        }

        Ok(Self {
            broker_url: value(BROKER_URL_KEY),
            username: value(USERNAME_KEY),
            password: value(PASSWORD_KEY),
            topic: value(TOPIC_KEY),
        })
    }
}

/// Parses `KEY=value` lines. Lines are trimmed; blank lines and lines
/// starting with `#` are ignored, as are lines without `=`. Keys and values
/// are trimmed and any quotes around the value are stripped. Values are
/// otherwise kept verbatim: no substitution, escapes or inline comments.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>, EnvFileError> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => EnvFileError::NotFound(path.to_path_buf()),
        _ => EnvFileError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })?;

    Ok(parse_env_lines(&contents))
}

fn parse_env_lines(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            debug!("Skipping line without '=': {}", line);
            continue;
        };

        let value = value.trim().trim_matches(['\'', '"']);
        vars.insert(key.trim().to_string(), value.to_string());
    }
    vars
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use uuid::Uuid;

    pub(crate) fn write_env_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("thermoflux_{}.env", Uuid::new_v4()));
        fs::write(&path, contents).expect("write env file");
        path
    }

    #[test]
    fn test_reads_required_and_optional_keys() {
        let path = write_env_file(
            "# broker settings\n\
             \n\
             MQTT_BROKER_URL=\"wss://broker.example.com:8884/mqtt\"\n\
             MQTT_TOPIC='sensors/tc74'\n\
             MQTT_USERNAME=dashboard\n\
             MQTT_PASSWORD='s3cret'\n",
        );

        let settings = BrokerSettings::from_env_file(&path).unwrap();
        assert_eq!(settings.broker_url, "wss://broker.example.com:8884/mqtt");
        assert_eq!(settings.topic, "sensors/tc74");
        assert_eq!(settings.username, "dashboard");
        assert_eq!(settings.password, "s3cret");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_optional_keys_default_to_empty() {
        let path = write_env_file("MQTT_BROKER_URL=mqtt://localhost:1883\nMQTT_TOPIC=home/temp\n");

        let settings = BrokerSettings::from_env_file(&path).unwrap();
        assert_eq!(settings.username, "");
        assert_eq!(settings.password, "");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_missing_required_keys() {
        let path = write_env_file("MQTT_BROKER_URL=mqtt://localhost:1883\nMQTT_TOPIC=\n");

        let err = BrokerSettings::from_env_file(&path).unwrap_err();
        assert_eq!(err.missing_keys(), &[TOPIC_KEY]);

        let path_without_url = write_env_file("MQTT_USERNAME=someone\n");
        let err = BrokerSettings::from_env_file(&path_without_url).unwrap_err();
        assert_eq!(err.missing_keys(), &[BROKER_URL_KEY, TOPIC_KEY]);
        let _ = fs::remove_file(path);
        let _ = fs::remove_file(path_without_url);
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join(format!("thermoflux_missing_{}.env", Uuid::new_v4()));
        let err = BrokerSettings::from_env_file(&path).unwrap_err();
        assert!(matches!(err, EnvFileError::NotFound(_)));
        assert_eq!(err.to_string(), ".env file not found");
    }

    #[test]
    fn test_values_are_kept_verbatim() {
        let path = write_env_file(
            "MQTT_BROKER_URL=mqtt://localhost:1883\n\
             MQTT_TOPIC=living room\n\
             MQTT_USERNAME=abc #def\n\
             MQTT_PASSWORD=pa$word\n",
        );

        let settings = BrokerSettings::from_env_file(&path).unwrap();
        assert_eq!(settings.topic, "living room");
        assert_eq!(settings.username, "abc #def");
        assert_eq!(settings.password, "pa$word");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_quotes_are_stripped_leniently() {
        let vars = parse_env_lines(
            "  MQTT_PASSWORD=\"pa$word\"  \n\
             MQTT_USERNAME=\"abc\n\
             MQTT_TOPIC = 'a=b'\n\
             not a pair\n\
             \t# indented comment\n",
        );

        assert_eq!(vars.get(PASSWORD_KEY).map(String::as_str), Some("pa$word"));
        assert_eq!(vars.get(USERNAME_KEY).map(String::as_str), Some("abc"));
        assert_eq!(vars.get(TOPIC_KEY).map(String::as_str), Some("a=b"));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_serializes_camel_case() {
        let settings = BrokerSettings {
            broker_url: "mqtt://localhost".to_string(),
            username: String::new(),
            password: String::new(),
            topic: "t".to_string(),
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["brokerUrl"], "mqtt://localhost");
        assert_eq!(json["topic"], "t");
    }
}
