// Copyright (c) 2024 Botho Foundation

//! Engine configuration.
//!
//! ```toml
//! listen = "127.0.0.1:7400"
//! relay_rate = 1
//! session_allowance = 1000000
//!
//! [logging]
//! verbose = false
//! filter = "veil=debug"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::wire::AddrPort;

/// Configuration for one onion engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Address this node receives messages on
    #[serde(default = "default_listen")]
    pub listen: AddrPort,
    /// Price per forwarded byte for sessions bought here
    #[serde(default = "default_relay_rate")]
    pub relay_rate: u64,
    /// Credit granted when a payment does not state an amount
    #[serde(default = "default_session_allowance")]
    pub session_allowance: u64,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Bound on a local service round trip for Exit layers
    #[serde(default = "default_service_timeout_ms")]
    pub service_timeout_ms: u64,
    /// How long a client waits for a reply before its request times out
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Interval between sweeps of pending requests and expired sessions
    #[serde(default = "default_pending_sweep_ms")]
    pub pending_sweep_ms: u64,
    /// Longest Delay layer this node will hold a message for
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log at debug level
    #[serde(default)]
    pub verbose: bool,
    /// `EnvFilter` directives, overriding `verbose`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

fn default_listen() -> AddrPort {
    AddrPort::new(([127, 0, 0, 1], 7400).into())
}

fn default_relay_rate() -> u64 {
    1
}

fn default_session_allowance() -> u64 {
    1_000_000
}

fn default_session_ttl_secs() -> u64 {
    3600
}

fn default_service_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_pending_sweep_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(default_listen())
    }
}

impl EngineConfig {
    /// Default settings listening on `listen`.
    pub fn new(listen: AddrPort) -> Self {
        Self {
            listen,
            relay_rate: default_relay_rate(),
            session_allowance: default_session_allowance(),
            session_ttl_secs: default_session_ttl_secs(),
            service_timeout_ms: default_service_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pending_sweep_ms: default_pending_sweep_ms(),
            max_delay_ms: default_max_delay_ms(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Never zero; a zero interval would make the sweep timer panic.
    pub fn pending_sweep(&self) -> Duration {
        Duration::from_millis(self.pending_sweep_ms.max(1))
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Load config from a file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.listen.to_string(), "127.0.0.1:7400");
        assert_eq!(config.relay_rate, 1);
        assert_eq!(config.session_ttl(), Duration::from_secs(3600));
        assert_eq!(config.service_timeout(), Duration::from_secs(5));
        assert_eq!(config.pending_sweep(), Duration::from_secs(1));
        assert_eq!(config.max_delay(), Duration::from_secs(60));
        assert!(!config.logging.verbose);
        assert!(config.logging.filter.is_none());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("veil.toml");

        let mut config = EngineConfig::new("10.0.0.2:9000".parse().unwrap());
        config.relay_rate = 4;
        config.logging.filter = Some("veil=trace".to_string());
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("veil.toml");
        fs::write(&path, "listen = \"[::1]:7000\"\nrelay_rate = 9\n").unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.listen.to_string(), "[::1]:7000");
        assert_eq!(loaded.relay_rate, 9);
        assert_eq!(loaded.session_allowance, 1_000_000);
        assert_eq!(loaded.logging, LoggingConfig::default());
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let err = EngineConfig::load(&missing).unwrap_err();
        assert!(err.to_string().contains("missing.toml"));

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "relay_rate = \"lots\"").unwrap();
        let err = EngineConfig::load(&bad).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse config"));
    }

    #[test]
    fn test_zero_sweep_clamped() {
        let mut config = EngineConfig::default();
        config.pending_sweep_ms = 0;
        assert_eq!(config.pending_sweep(), Duration::from_millis(1));
    }
}
