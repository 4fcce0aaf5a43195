//! Client configuration, read from the environment.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
pub const BASE_URL_VAR: &str = "TIMETRACKER_API_URL";
pub const TIMEOUT_VAR: &str = "TIMETRACKER_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
    #[error("{var} must be a positive number of seconds, got '{value}'")]
    InvalidTimeout { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, without trailing slash. Endpoint paths are appended to it.
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Period of the elapsed-time tick while a timer is running.
    pub tick_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an arbitrary variable lookup. Unset variables keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(BASE_URL_VAR) {
            let url = url.trim().trim_end_matches('/');
            if url.is_empty() {
                return Err(ConfigError::Empty { var: BASE_URL_VAR });
            }
            config.base_url = url.to_string();
        }

        if let Some(raw) = lookup(TIMEOUT_VAR) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidTimeout {
                    var: TIMEOUT_VAR,
                    value: raw.clone(),
                })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn reads_url_and_timeout() {
        let config = ClientConfig::from_lookup(lookup(&[
            (BASE_URL_VAR, "https://timer.example.com/api/"),
            (TIMEOUT_VAR, "30"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://timer.example.com/api");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_empty_url() {
        let err = ClientConfig::from_lookup(lookup(&[(BASE_URL_VAR, "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Empty { var: BASE_URL_VAR });
    }

    #[test]
    fn rejects_bad_timeout() {
        for value in ["0", "ten", "-1"] {
            let err = ClientConfig::from_lookup(lookup(&[(TIMEOUT_VAR, value)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidTimeout { .. }), "value {value}");
        }
    }
}
