//! Engine configuration.
//!
//! Durations are expressed in whole seconds both in serialized form and in
//! `MEDSTOCK_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use medstock_observability::LogFormat;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: expected {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(with = "secs")]
    pub evaluation_interval: Duration,
    pub run_on_startup: bool,
    #[serde(with = "secs")]
    pub cycle_timeout: Duration,
    #[serde(with = "secs")]
    pub action_timeout: Duration,
    #[serde(with = "secs")]
    pub notify_timeout: Duration,
    /// Withdraw pending requests once their medicine is back above threshold.
    pub auto_cancel_resolved: bool,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation_interval: Duration::from_secs(300),
            run_on_startup: true,
            cycle_timeout: Duration::from_secs(30),
            action_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(15),
            auto_cancel_resolved: true,
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by any `MEDSTOCK_*` variables present.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = seconds(&lookup, "MEDSTOCK_EVALUATION_INTERVAL_SECS")? {
            cfg.evaluation_interval = v;
        }
        if let Some(v) = flag(&lookup, "MEDSTOCK_RUN_ON_STARTUP")? {
            cfg.run_on_startup = v;
        }
        if let Some(v) = seconds(&lookup, "MEDSTOCK_CYCLE_TIMEOUT_SECS")? {
            cfg.cycle_timeout = v;
        }
        if let Some(v) = seconds(&lookup, "MEDSTOCK_ACTION_TIMEOUT_SECS")? {
            cfg.action_timeout = v;
        }
        if let Some(v) = seconds(&lookup, "MEDSTOCK_NOTIFY_TIMEOUT_SECS")? {
            cfg.notify_timeout = v;
        }
        if let Some(v) = flag(&lookup, "MEDSTOCK_AUTO_CANCEL_RESOLVED")? {
            cfg.auto_cancel_resolved = v;
        }
        if let Some(raw) = lookup("MEDSTOCK_LOG_FORMAT") {
            cfg.log_format = raw.parse().map_err(|_| ConfigError::Invalid {
                var: "MEDSTOCK_LOG_FORMAT",
                expected: "json or text",
                value: raw,
            })?;
        }

        Ok(cfg)
    }
}

fn seconds<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(Some(Duration::from_secs(n))),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a positive number of seconds",
            value: raw,
        }),
    }
}

fn flag<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a boolean",
            value: raw,
        }),
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let cfg = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.evaluation_interval, Duration::from_secs(300));
        assert!(cfg.auto_cancel_resolved);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("MEDSTOCK_EVALUATION_INTERVAL_SECS", "60"),
            ("MEDSTOCK_RUN_ON_STARTUP", "false"),
            ("MEDSTOCK_AUTO_CANCEL_RESOLVED", "off"),
            ("MEDSTOCK_LOG_FORMAT", "text"),
        ]))
        .unwrap();
        assert_eq!(cfg.evaluation_interval, Duration::from_secs(60));
        assert!(!cfg.run_on_startup);
        assert!(!cfg.auto_cancel_resolved);
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert_eq!(cfg.notify_timeout, Duration::from_secs(15));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[("MEDSTOCK_CYCLE_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(err.to_string().contains("MEDSTOCK_CYCLE_TIMEOUT_SECS"));

        assert!(EngineConfig::from_lookup(lookup(&[("MEDSTOCK_RUN_ON_STARTUP", "maybe")])).is_err());
    }

    #[test]
    fn deserializes_partial_json_with_seconds() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"evaluation_interval": 120, "log_format": "text"}"#).unwrap();
        assert_eq!(cfg.evaluation_interval, Duration::from_secs(120));
        assert_eq!(cfg.action_timeout, Duration::from_secs(10));
        assert_eq!(cfg.log_format, LogFormat::Text);
    }
}
