//! Configuration file support for SEP CLI tools

use sep::ProtocolConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tick loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSettings {
    /// Loop frequency in ticks per second
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    /// Messages per second while the connection is healthy
    #[serde(default = "default_send_rate")]
    pub send_rate_hz: u32,
    /// Messages per second while the connection is flooded
    #[serde(default = "default_flooded_send_rate")]
    pub flooded_send_rate_hz: u32,
    /// Size of each outgoing payload
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    /// Statistics interval in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_tick_rate() -> u32 {
    60
}

fn default_send_rate() -> u32 {
    30
}

fn default_flooded_send_rate() -> u32 {
    10
}

fn default_payload_size() -> usize {
    32
}

fn default_stats_interval() -> u64 {
    1
}

impl Default for PeerSettings {
    fn default() -> Self {
        PeerSettings {
            tick_rate_hz: default_tick_rate(),
            send_rate_hz: default_send_rate(),
            flooded_send_rate_hz: default_flooded_send_rate(),
            payload_size: default_payload_size(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl PeerSettings {
    pub fn tick_interval(&self) -> Duration {
        rate_to_interval(self.tick_rate_hz)
    }

    /// Time between sends, depending on the flood state
    pub fn send_interval(&self, flooded: bool) -> Duration {
        if flooded {
            rate_to_interval(self.flooded_send_rate_hz)
        } else {
            rate_to_interval(self.send_rate_hz)
        }
    }

    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

fn rate_to_interval(rate_hz: u32) -> Duration {
    Duration::from_secs(1) / rate_hz.max(1)
}

/// Combined configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Transport settings
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Tick loop settings
    #[serde(default)]
    pub peer: PeerSettings,
}

impl PeerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: PeerConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Example configuration talking to one LAN peer
    pub fn example() -> Self {
        PeerConfig {
            protocol: ProtocolConfig::for_host("192.168.1.20"),
            peer: PeerSettings::default(),
        }
    }

    /// Check values the protocol itself does not validate
    pub fn validate(&self) -> Result<(), ConfigError> {
        let peer = &self.peer;
        if peer.tick_rate_hz == 0 {
            return Err(ConfigError::Invalid("tick_rate_hz must be positive".into()));
        }
        if peer.send_rate_hz == 0 || peer.flooded_send_rate_hz == 0 {
            return Err(ConfigError::Invalid("send rates must be positive".into()));
        }
        if peer.payload_size > self.protocol.max_payload_size {
            return Err(ConfigError::Invalid(format!(
                "payload_size {} exceeds max_payload_size {}",
                peer.payload_size, self.protocol.max_payload_size
            )));
        }
        if self.protocol.hosts.is_empty() {
            return Err(ConfigError::Invalid("no remote host configured".into()));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
