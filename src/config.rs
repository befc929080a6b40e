// Runtime configuration, read from the environment (optionally seeded
// from a `.env` file by `main`).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::record::WireNames;

pub const DEFAULT_API_URL: &str = "http://localhost:8010";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 3;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },
    #[error("{var} must be true or false, got {value:?}")]
    InvalidFlag { var: &'static str, value: String },
    #[error("{var} must be one of {expected}, got {value:?}")]
    InvalidChoice {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the remote catalog, without trailing slash.
    pub api_url: String,
    /// Backing file of the local catalog.
    pub data_file: PathBuf,
    /// Timeout for the liveness probe.
    pub probe_timeout: Duration,
    /// Timeout for every other remote request.
    pub request_timeout: Duration,
    /// Export per-make / per-fuel / per-transmission files on local saves.
    pub subgroups: bool,
    /// Field names the remote service expects in bodies and parameters.
    pub wire_names: WireNames,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            data_file: default_data_file(),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            subgroups: true,
            wire_names: WireNames::Canonical,
        }
    }
}

impl Config {
    /// Read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup; unset keys use defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if let Some(url) = lookup("CATALOG_API_URL").filter(|v| !v.trim().is_empty()) {
            config.api_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(path) = lookup("CATALOG_FILE").filter(|v| !v.trim().is_empty()) {
            config.data_file = PathBuf::from(path.trim());
        }
        if let Some(value) = lookup("CATALOG_PROBE_TIMEOUT_SECS") {
            config.probe_timeout = seconds("CATALOG_PROBE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("CATALOG_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = seconds("CATALOG_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("CATALOG_SUBGROUPS") {
            config.subgroups = flag("CATALOG_SUBGROUPS", &value)?;
        }
        if let Some(value) = lookup("CATALOG_WIRE_NAMES").filter(|v| !v.trim().is_empty()) {
            config.wire_names = value.parse().map_err(|_| ConfigError::InvalidChoice {
                var: "CATALOG_WIRE_NAMES",
                expected: "canonical or localized",
                value: value.clone(),
            })?;
        }
        Ok(config)
    }
}

fn default_data_file() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("vehicle-catalog"))
        .unwrap_or_else(|| PathBuf::from("data"))
        .join("autos.csv")
}

fn seconds(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidSeconds {
            var,
            value: value.to_string(),
        }),
    }
}

fn flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            var,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.probe_timeout, Duration::from_secs(3));
        assert!(config.subgroups);
        assert_eq!(config.wire_names, WireNames::Canonical);
        assert!(config.data_file.ends_with("autos.csv"));
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("CATALOG_API_URL", "http://10.0.0.5:8010/"),
            ("CATALOG_FILE", "/tmp/cars.csv"),
            ("CATALOG_PROBE_TIMEOUT_SECS", "1"),
            ("CATALOG_SUBGROUPS", "off"),
            ("CATALOG_WIRE_NAMES", "Spanish"),
        ]))
        .expect("config");
        assert_eq!(config.api_url, "http://10.0.0.5:8010");
        assert_eq!(config.data_file, PathBuf::from("/tmp/cars.csv"));
        assert_eq!(config.probe_timeout, Duration::from_secs(1));
        assert!(!config.subgroups);
        assert_eq!(config.wire_names, WireNames::Localized);
    }

    #[test]
    fn rejects_malformed_values() {
        let err = Config::from_lookup(lookup(&[("CATALOG_REQUEST_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidSeconds {
                var: "CATALOG_REQUEST_TIMEOUT_SECS",
                value: "soon".into()
            }
        );
        assert!(Config::from_lookup(lookup(&[("CATALOG_SUBGROUPS", "maybe")])).is_err());
        assert!(matches!(
            Config::from_lookup(lookup(&[("CATALOG_WIRE_NAMES", "klingon")])),
            Err(ConfigError::InvalidChoice { var: "CATALOG_WIRE_NAMES", .. })
        ));
    }
}
