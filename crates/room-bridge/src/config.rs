//! Room Bridge service configuration.
//!
//! Loaded from environment variables. Media service credentials are NOT part
//! of this configuration; they live in [`crate::settings`] because they can
//! change at runtime.

use common::jwt::MAX_ROOM_TOKEN_TTL;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default path of the persisted settings file.
pub const DEFAULT_SETTINGS_PATH: &str = ".env";

/// Default room token lifetime in seconds (six hours).
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 21_600;

/// Default audio level sampling interval in milliseconds.
pub const DEFAULT_AUDIO_SAMPLE_INTERVAL_MS: u64 = 50;

/// Default time to wait for the room client to report a connect outcome.
pub const DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS: u64 = 15;

/// Room Bridge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Flat `KEY=value` file holding media service settings (default: ".env").
    pub settings_path: PathBuf,

    /// Lifetime of issued room tokens (default: 6 hours, max: 24 hours).
    pub token_ttl: Duration,

    /// Audio level sampling period while connected (default: 50ms).
    pub audio_sample_interval: Duration,

    /// How long a connect waits for the room client (default: 15s).
    pub relay_connect_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BRIDGE_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let settings_path = vars
            .get("BRIDGE_SETTINGS_PATH")
            .map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH), PathBuf::from);

        let token_ttl_seconds = parse_u64(vars, "BRIDGE_TOKEN_TTL_SECONDS", DEFAULT_TOKEN_TTL_SECONDS)?;
        if token_ttl_seconds == 0 || token_ttl_seconds > MAX_ROOM_TOKEN_TTL.as_secs() {
            return Err(ConfigError::InvalidValue(format!(
                "BRIDGE_TOKEN_TTL_SECONDS must be between 1 and {}, got {token_ttl_seconds}",
                MAX_ROOM_TOKEN_TTL.as_secs()
            )));
        }

        let sample_interval_ms = parse_u64(
            vars,
            "BRIDGE_AUDIO_SAMPLE_INTERVAL_MS",
            DEFAULT_AUDIO_SAMPLE_INTERVAL_MS,
        )?;
        if sample_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "BRIDGE_AUDIO_SAMPLE_INTERVAL_MS must be greater than 0".to_string(),
            ));
        }

        let connect_timeout_seconds = parse_u64(
            vars,
            "BRIDGE_RELAY_CONNECT_TIMEOUT_SECONDS",
            DEFAULT_RELAY_CONNECT_TIMEOUT_SECONDS,
        )?;
        if connect_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "BRIDGE_RELAY_CONNECT_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }

        Ok(Config {
            bind_address,
            settings_path,
            token_ttl: Duration::from_secs(token_ttl_seconds),
            audio_sample_interval: Duration::from_millis(sample_interval_ms),
            relay_connect_timeout: Duration::from_secs(connect_timeout_seconds),
        })
    }
}

fn parse_u64(vars: &HashMap<String, String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            ConfigError::InvalidValue(format!("{name} must be a non-negative integer: {e}"))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("defaults should load");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.settings_path, PathBuf::from(".env"));
        assert_eq!(config.token_ttl, Duration::from_secs(6 * 60 * 60));
        assert_eq!(config.audio_sample_interval, Duration::from_millis(50));
        assert_eq!(config.relay_connect_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_from_vars_custom_values() {
        let config = Config::from_vars(&vars(&[
            ("BRIDGE_BIND_ADDRESS", "127.0.0.1:9000"),
            ("BRIDGE_SETTINGS_PATH", "/var/lib/bridge/settings.env"),
            ("BRIDGE_TOKEN_TTL_SECONDS", "600"),
            ("BRIDGE_AUDIO_SAMPLE_INTERVAL_MS", "100"),
            ("BRIDGE_RELAY_CONNECT_TIMEOUT_SECONDS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(
            config.settings_path,
            PathBuf::from("/var/lib/bridge/settings.env")
        );
        assert_eq!(config.token_ttl, Duration::from_secs(600));
        assert_eq!(config.audio_sample_interval, Duration::from_millis(100));
        assert_eq!(config.relay_connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_token_ttl_bounds() {
        let zero = Config::from_vars(&vars(&[("BRIDGE_TOKEN_TTL_SECONDS", "0")]));
        assert!(matches!(zero, Err(ConfigError::InvalidValue(_))));

        let too_long = Config::from_vars(&vars(&[("BRIDGE_TOKEN_TTL_SECONDS", "86401")]));
        assert!(matches!(too_long, Err(ConfigError::InvalidValue(_))));

        let max = Config::from_vars(&vars(&[("BRIDGE_TOKEN_TTL_SECONDS", "86400")])).unwrap();
        assert_eq!(max.token_ttl, MAX_ROOM_TOKEN_TTL);
    }

    #[test]
    fn test_rejects_non_numeric_values() {
        let result = Config::from_vars(&vars(&[("BRIDGE_AUDIO_SAMPLE_INTERVAL_MS", "fast")]));

        let err = result.expect_err("non-numeric interval should be rejected");
        assert!(
            matches!(&err, ConfigError::InvalidValue(msg) if msg.contains("BRIDGE_AUDIO_SAMPLE_INTERVAL_MS")),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_rejects_zero_intervals() {
        assert!(Config::from_vars(&vars(&[("BRIDGE_AUDIO_SAMPLE_INTERVAL_MS", "0")])).is_err());
        assert!(
            Config::from_vars(&vars(&[("BRIDGE_RELAY_CONNECT_TIMEOUT_SECONDS", "0")])).is_err()
        );
    }
}
