//! Configuration Management for LX200R
//!
//! Property-based configuration with typed getters and JSON persistence.
//! Properties use dotted keys (`run.settleDelayMs`); [`TesterConfig::runner_config`]
//! turns the `run.*` group into a validated [`RunnerConfig`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::ResponseCollector;
use crate::constants::{
    HEALTHY_SUCCESS_RATE, MAX_RESPONSE_BYTES, POLL_INTERVAL, PROBE_RESPONSE_TIMEOUT,
    RUN_RESPONSE_TIMEOUT, SETTLE_DELAY, TERMINATOR,
};
use crate::error::{ConfigError, ConfigResult};
use crate::runner::RunnerConfig;

/// Supported configuration value types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
}

impl ConfigValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

/// How the tester reaches the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    Tcp,
    Emulator,
}

/// Parse a connection mode string ("tcp" or "emulator", case-insensitive)
pub fn parse_connection_mode(value: &str) -> ConfigResult<ConnectionMode> {
    match value.trim().to_lowercase().as_str() {
        "tcp" => Ok(ConnectionMode::Tcp),
        "emulator" | "emulate" => Ok(ConnectionMode::Emulator),
        _ => Err(ConfigError::InvalidParameter {
            parameter: "connection.mode".to_string(),
            value: value.to_string(),
            reason: "Must be 'tcp' or 'emulator'".to_string(),
        }),
    }
}

/// Tester configuration
#[derive(Debug, Clone)]
pub struct TesterConfig {
    properties: HashMap<String, ConfigValue>,
    config_resource: String,
}

impl TesterConfig {
    /// Create a configuration with default values
    pub fn new(config_resource: String) -> Self {
        let mut config = Self {
            properties: HashMap::new(),
            config_resource,
        };
        config.set_defaults();
        config
    }

    fn set_defaults(&mut self) {
        let ms = |d: Duration| d.as_millis() as i64;

        // Connection settings
        self.properties.insert("connection.mode".to_string(), "tcp".into());
        self.properties.insert("connection.address".to_string(), "localhost:4030".into());
        self.properties.insert("connection.openTimeoutMs".to_string(), 5000i64.into());

        // Run settings
        self.properties.insert("run.responseTimeoutMs".to_string(), ms(RUN_RESPONSE_TIMEOUT).into());
        self.properties.insert("run.probeTimeoutMs".to_string(), ms(PROBE_RESPONSE_TIMEOUT).into());
        self.properties.insert("run.settleDelayMs".to_string(), ms(SETTLE_DELAY).into());
        self.properties.insert("run.pollIntervalMs".to_string(), ms(POLL_INTERVAL).into());
        self.properties.insert("run.maxResponseBytes".to_string(), (MAX_RESPONSE_BYTES as i64).into());

        // Report settings
        self.properties.insert("report.healthyRatePercent".to_string(), HEALTHY_SUCCESS_RATE.into());
    }

    pub fn get_string_property(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(|v| v.as_string().map(|s| s.to_string()))
    }

    pub fn get_string_property_or(&self, key: &str, default: &str) -> String {
        self.get_string_property(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_int_property(&self, key: &str) -> Option<i64> {
        self.properties.get(key).and_then(|v| v.as_integer())
    }

    pub fn get_int_property_or(&self, key: &str, default: i64) -> i64 {
        self.get_int_property(key).unwrap_or(default)
    }

    pub fn get_float_property_or(&self, key: &str, default: f64) -> f64 {
        self.properties.get(key).and_then(|v| v.as_float()).unwrap_or(default)
    }

    pub fn set_property<T: Into<ConfigValue>>(&mut self, key: &str, value: T) {
        let new_value = value.into();
        if let Some(old) = self.properties.insert(key.to_string(), new_value.clone()) {
            if old != new_value {
                log::debug!("Config {key}: {old:?} -> {new_value:?}");
            }
        }
    }

    pub fn get_config_resource(&self) -> &str {
        &self.config_resource
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.properties)
    }

    /// Merge properties from JSON over the current values
    pub fn from_json(&mut self, json: &str) -> Result<(), serde_json::Error> {
        let loaded: HashMap<String, ConfigValue> = serde_json::from_str(json)?;
        for (key, value) in loaded {
            self.set_property(&key, value);
        }
        Ok(())
    }

    pub fn connection_mode(&self) -> ConfigResult<ConnectionMode> {
        parse_connection_mode(&self.get_string_property_or("connection.mode", "tcp"))
    }

    pub fn address(&self) -> String {
        self.get_string_property_or("connection.address", "localhost:4030")
    }

    /// Bounds both the connect and every write on the link
    pub fn open_timeout(&self) -> ConfigResult<Duration> {
        let timeout = self.duration_ms("connection.openTimeoutMs", 5000)?;
        if timeout.is_zero() {
            return Err(ConfigError::InvalidParameter {
                parameter: "connection.openTimeoutMs".to_string(),
                value: "0".to_string(),
                reason: "Timeout must be positive".to_string(),
            });
        }
        Ok(timeout)
    }

    pub fn healthy_rate_percent(&self) -> f64 {
        self.get_float_property_or("report.healthyRatePercent", HEALTHY_SUCCESS_RATE)
    }

    fn duration_ms(&self, key: &str, default: i64) -> ConfigResult<Duration> {
        let value = self.get_int_property_or(key, default);
        if value < 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: key.to_string(),
                value: value.to_string(),
                reason: "Duration must not be negative".to_string(),
            });
        }
        Ok(Duration::from_millis(value as u64))
    }

    /// Typed runner settings from the `run.*` properties
    pub fn runner_config(&self) -> ConfigResult<RunnerConfig> {
        let max_bytes = self.get_int_property_or("run.maxResponseBytes", MAX_RESPONSE_BYTES as i64);
        if max_bytes <= 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "run.maxResponseBytes".to_string(),
                value: max_bytes.to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        let poll_interval = self.duration_ms("run.pollIntervalMs", POLL_INTERVAL.as_millis() as i64)?;
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidParameter {
                parameter: "run.pollIntervalMs".to_string(),
                value: "0".to_string(),
                reason: "Polling interval must be positive".to_string(),
            });
        }

        Ok(RunnerConfig {
            response_timeout: self.duration_ms("run.responseTimeoutMs", RUN_RESPONSE_TIMEOUT.as_millis() as i64)?,
            probe_timeout: self.duration_ms("run.probeTimeoutMs", PROBE_RESPONSE_TIMEOUT.as_millis() as i64)?,
            settle_delay: self.duration_ms("run.settleDelayMs", SETTLE_DELAY.as_millis() as i64)?,
            collector: ResponseCollector::new(TERMINATOR, max_bytes as usize, poll_interval),
        })
    }
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self::new(default_config_path().to_string_lossy().to_string())
    }
}

/// Determine the default config file path.
/// Priority:
/// 1) LX200R_CONFIG env var
/// 2) platform config dir: <config_dir>/lx200r/tester.json
/// 3) Current directory fallback: ./tester.json
pub fn default_config_path() -> PathBuf {
    if let Ok(p) = std::env::var("LX200R_CONFIG") {
        return PathBuf::from(p);
    }

    match dirs::config_dir() {
        Some(base) => base.join("lx200r").join("tester.json"),
        None => PathBuf::from("tester.json"),
    }
}

/// Load configuration from `path` if present; otherwise return defaults.
pub fn load_config(path: &Path) -> TesterConfig {
    let mut config = TesterConfig::new(path.to_string_lossy().to_string());

    if !path.exists() {
        log::debug!("No config file at {}, using defaults", path.display());
        return config;
    }

    match fs::read_to_string(path) {
        Ok(text) => {
            if let Err(e) = config.from_json(&text) {
                log::warn!("Failed to parse config file {}: {}", path.display(), e);
            }
        }
        Err(e) => log::warn!("Failed to read config file {}: {}", path.display(), e),
    }

    config
}

/// Save the configuration to its `config_resource` path
pub fn save_config(config: &TesterConfig) -> ConfigResult<()> {
    let path = PathBuf::from(config.get_config_resource());
    let file_error = |e: String| ConfigError::FileError {
        path: path.display().to_string(),
        error: e,
    };

    let json = config.to_json().map_err(|e| file_error(e.to_string()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| file_error(e.to_string()))?;
        }
    }
    fs::write(&path, json).map_err(|e| file_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = TesterConfig::new("test.json".to_string());
        assert_eq!(config.get_string_property_or("connection.mode", ""), "tcp");
        assert_eq!(config.get_int_property_or("run.settleDelayMs", 0), 1000);
        assert_eq!(config.get_int_property_or("run.maxResponseBytes", 0), 50);
        assert_eq!(config.healthy_rate_percent(), 80.0);
    }

    #[test]
    fn test_runner_config_matches_defaults() {
        let config = TesterConfig::new("test.json".to_string());
        assert_eq!(config.runner_config().unwrap(), RunnerConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = TesterConfig::new("test.json".to_string());
        config.set_property("run.settleDelayMs", -5i64);
        assert!(matches!(config.runner_config(), Err(ConfigError::InvalidParameter { .. })));

        let mut config = TesterConfig::new("test.json".to_string());
        config.set_property("run.maxResponseBytes", 0i64);
        assert!(config.runner_config().is_err());

        config.set_property("connection.mode", "serial");
        assert!(config.connection_mode().is_err());

        config.set_property("connection.openTimeoutMs", 0i64);
        assert!(config.open_timeout().is_err());
    }

    #[test]
    fn test_json_round_trip_merges() {
        let mut config = TesterConfig::new("test.json".to_string());
        config.set_property("connection.address", "10.0.0.5:4000");

        let json = config.to_json().expect("Serialization should work");
        let mut other = TesterConfig::new("other.json".to_string());
        other.from_json(&json).expect("Deserialization should work");
        assert_eq!(other.address(), "10.0.0.5:4000");
    }

    #[test]
    fn test_connection_mode_parsing() {
        assert_eq!(parse_connection_mode("TCP").unwrap(), ConnectionMode::Tcp);
        assert_eq!(parse_connection_mode(" emulator ").unwrap(), ConnectionMode::Emulator);
    }
}
