/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/config.rs
*
* Runtime configuration of the operator, read from the environment of the
* operator Pod. Every setting has a default so the operator starts with an
* empty environment.
*
* Durations use the short "30s" / "5m" / "2h" notation.
*
* SPDX-License-Identifier: Apache-2.0
*/

use std::time::Duration;
use thiserror::Error;

const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_ERROR_REQUEUE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_BACKUP_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_METRICS_PORT: u16 = 9090;
const DEFAULT_FIELD_MANAGER: &str = "ph-dr-controller";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid duration for {key}: '{value}'")]
    InvalidDuration { key: &'static str, value: String },
    #[error("Invalid port for {key}: '{value}'")]
    InvalidPort { key: &'static str, value: String },
    #[error("Invalid log format '{0}', expected 'text' or 'json'")]
    InvalidLogFormat(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Delay before the next pass when a pass asked to be requeued.
    pub requeue_interval: Duration,
    /// Delay before retrying a pass that returned an error.
    pub error_requeue_interval: Duration,
    /// Timeout for a single request to the backup object store.
    pub backup_timeout: Duration,
    pub metrics_port: u16,
    /// Server-side apply field manager used for status writes.
    pub field_manager: String,
    pub log_format: LogFormat,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            error_requeue_interval: DEFAULT_ERROR_REQUEUE_INTERVAL,
            backup_timeout: DEFAULT_BACKUP_TIMEOUT,
            metrics_port: DEFAULT_METRICS_PORT,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("REQUEUE_INTERVAL") {
            config.requeue_interval = duration_setting("REQUEUE_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("ERROR_REQUEUE_INTERVAL") {
            config.error_requeue_interval = duration_setting("ERROR_REQUEUE_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("BACKUP_TIMEOUT") {
            config.backup_timeout = duration_setting("BACKUP_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("METRICS_PORT") {
            config.metrics_port = value.trim().parse().map_err(|_| ConfigError::InvalidPort {
                key: "METRICS_PORT",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("FIELD_MANAGER").filter(|v| !v.trim().is_empty()) {
            config.field_manager = value.trim().to_string();
        }
        if let Some(value) = lookup("LOG_FORMAT") {
            config.log_format = match value.trim().to_ascii_lowercase().as_str() {
                "text" | "" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => return Err(ConfigError::InvalidLogFormat(value)),
            };
        }

        Ok(config)
    }
}

fn duration_setting(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration_str(value).ok_or_else(|| ConfigError::InvalidDuration {
        key,
        value: value.to_string(),
    })
}

/// Parses a simple duration string (e.g., "1m", "30s") into a `Duration`.
pub fn parse_duration_str(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(num_str) = s.strip_suffix('s') {
        num_str.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(num_str) = s.strip_suffix('m') {
        num_str
            .parse::<u64>()
            .ok()
            .and_then(|mins| mins.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(num_str) = s.strip_suffix('h') {
        num_str
            .parse::<u64>()
            .ok()
            .and_then(|hours| hours.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<OperatorConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OperatorConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_parse_duration_str() {
        assert_eq!(parse_duration_str("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration_str("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration_str("2h"), Some(Duration::from_secs(7200)));

        assert!(parse_duration_str("invalid").is_none());
        assert!(parse_duration_str("30x").is_none());
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        assert!(parse_duration_str("99999999999999999h").is_none());
        assert!(parse_duration_str("999999999999999999m").is_none());
        assert_eq!(
            config_from(&[("BACKUP_TIMEOUT", "99999999999999999h")]),
            Err(ConfigError::InvalidDuration {
                key: "BACKUP_TIMEOUT",
                value: "99999999999999999h".to_string(),
            })
        );
    }

    #[test]
    fn test_defaults_with_empty_environment() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.requeue_interval, Duration::from_secs(10));
        assert_eq!(config.field_manager, "ph-dr-controller");
    }

    #[test]
    fn test_overrides_from_environment() {
        let config = config_from(&[
            ("REQUEUE_INTERVAL", "1m"),
            ("METRICS_PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("FIELD_MANAGER", "dr-hub"),
        ])
        .unwrap();
        assert_eq!(config.requeue_interval, Duration::from_secs(60));
        assert_eq!(config.metrics_port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.field_manager, "dr-hub");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert_eq!(
            config_from(&[("BACKUP_TIMEOUT", "soon")]),
            Err(ConfigError::InvalidDuration {
                key: "BACKUP_TIMEOUT",
                value: "soon".to_string()
            })
        );
        assert!(matches!(
            config_from(&[("METRICS_PORT", "99999")]),
            Err(ConfigError::InvalidPort { .. })
        ));
        assert!(matches!(
            config_from(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }
}
