//! Configuration for the calmwave client.

use crate::core::buffer::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration, stored as JSON in the user's config directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Streaming endpoint (`ws://` or `wss://`)
    pub endpoint_url: String,

    /// Base URL of the historical event query service
    pub query_url: String,

    /// User whose history is queried
    pub user_id: String,

    /// Delay before reconnecting after a close
    #[serde(with = "duration_serde")]
    pub retry_interval: Duration,

    /// Period of the connection liveness check
    #[serde(with = "duration_serde")]
    pub liveness_interval: Duration,

    /// Longest wait for the WebSocket handshake before the attempt is abandoned
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Samples kept per rolling series
    pub buffer_capacity: usize,

    /// Whether system notifications may be shown
    pub notifications: bool,

    /// Path for storing the activity log
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calmwave");

        Self {
            endpoint_url: "ws://localhost:8765".to_string(),
            query_url: "http://localhost:8000".to_string(),
            user_id: "default".to_string(),
            retry_interval: Duration::from_secs(3),
            liveness_interval: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(3),
            buffer_capacity: DEFAULT_CAPACITY,
            notifications: true,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calmwave")
            .join("config.json")
    }

    /// Location of the persisted activity log.
    pub fn activity_path(&self) -> PathBuf {
        self.data_path.join("activity.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint_url.starts_with("ws://") || self.endpoint_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "endpoint_url must use ws:// or wss://, got {}",
                self.endpoint_url
            )));
        }
        if self.retry_interval.is_zero()
            || self.liveness_interval.is_zero()
            || self.connect_timeout.is_zero()
        {
            return Err(ConfigError::Invalid(
                "retry_interval, liveness_interval and connect_timeout must be at least one second"
                    .to_string(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint_url, "ws://localhost:8765");
        assert_eq!(config.retry_interval, Duration::from_secs(3));
        assert_eq!(config.liveness_interval, Duration::from_secs(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.buffer_capacity, 60);
        assert!(config.notifications);
        assert!(config.validate().is_ok());
        assert!(config.activity_path().ends_with("activity.json"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config =
            Config::from_json(r#"{"endpoint_url":"wss://stream.example.com","retry_interval":5}"#)
                .unwrap();
        assert_eq!(config.endpoint_url, "wss://stream.example.com");
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.user_id, "default");
    }

    #[test]
    fn test_durations_serialize_as_seconds() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["retry_interval"], 3);
        assert_eq!(json["liveness_interval"], 3);
        assert_eq!(json["connect_timeout"], 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            Config::from_json(r#"{"endpoint_url":"http://localhost:8765"}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{"connect_timeout":0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{"buffer_capacity":0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_json("not json"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
