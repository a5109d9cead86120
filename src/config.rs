//! Configuration for setu-link endpoints
//!
//! Loads configuration from a TOML file. All peers on the link share the
//! same first three address octets; the coordinator reserves one table slot
//! per octet in the configured `[min_peer_octet, max_peer_octet]` range.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

/// Network configuration shared by both endpoint roles
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Coordinator address (e.g. `192.168.1.61`)
    pub server_addr: String,
    /// TCP port number
    pub port: u16,
    /// Smallest fourth octet among the configured peers
    pub min_peer_octet: u8,
    /// Largest fourth octet among the configured peers
    pub max_peer_octet: u8,
    /// Update frequency in Hz; the readiness poll blocks for at most
    /// `1000 / update_hz` milliseconds per cycle
    pub update_hz: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl NetworkConfig {
    /// Number of peer slots `C` covered by the configured octet range
    pub fn peer_count(&self) -> usize {
        (self.max_peer_octet - self.min_peer_octet) as usize + 1
    }

    /// Readiness poll timeout derived from the update frequency
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis((1000.0 / self.update_hz).round() as u64)
    }

    /// Coordinator socket address clients connect to
    pub fn server_socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server_addr, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid server address: {}", e)))
    }

    /// Check range and frequency constraints
    pub fn validate(&self) -> Result<()> {
        if self.min_peer_octet > self.max_peer_octet {
            return Err(Error::Config(format!(
                "min_peer_octet {} exceeds max_peer_octet {}",
                self.min_peer_octet, self.max_peer_octet
            )));
        }
        if !(self.update_hz > 0.0) {
            return Err(Error::Config(format!(
                "update_hz must be positive, got {}",
                self.update_hz
            )));
        }
        Ok(())
    }
}

impl LinkConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: LinkConfig = toml::from_str(&contents)?;
        config.network.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration for a single-robot bench setup
    pub fn bench_defaults() -> Self {
        Self {
            network: NetworkConfig {
                server_addr: "192.168.1.61".to_string(),
                port: 8888,
                min_peer_octet: 10,
                max_peer_octet: 16,
                update_hz: 50.0,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::bench_defaults()
    }
}
