//! Persistence configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How step saves are attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Limit for a single save attempt
    #[serde(with = "humantime_serde")]
    pub save_timeout: Duration,

    /// Attempts after the first one
    pub max_retries: usize,

    /// Delay before the first retry; later retries back off exponentially
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            save_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl PersistenceConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PersistenceConfig::default();
        assert_eq!(config.save_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_human_readable_durations() {
        let config =
            PersistenceConfig::from_json(r#"{ "save_timeout": "1m 30s", "retry_delay": "50ms" }"#)
                .unwrap();
        assert_eq!(config.save_timeout, Duration::from_secs(90));
        assert_eq!(config.retry_delay, Duration::from_millis(50));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_serializes_durations_as_text() {
        let json = serde_json::to_value(PersistenceConfig::default()).unwrap();
        assert_eq!(json["save_timeout"], "10s");
        assert_eq!(json["retry_delay"], "200ms");
    }

    #[test]
    fn test_invalid_duration() {
        assert!(PersistenceConfig::from_json(r#"{ "save_timeout": "soon" }"#).is_err());
    }
}
