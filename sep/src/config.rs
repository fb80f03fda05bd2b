//! Protocol configuration

use crate::error::ProtocolError;
use sep_protocol::congestion::{
    FloodConfig, RttSmoothing, DEFAULT_FLOOD_PERIOD, DEFAULT_FLOOD_THRESHOLD, DEFAULT_REVIEW_WINDOW,
    MAX_FLOOD_PERIOD, MIN_FLOOD_PERIOD,
};
use sep_protocol::packet::{DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default port the protocol binds locally
pub const DEFAULT_LOCAL_PORT: u16 = 10111;

/// Default port remote peers listen on
pub const DEFAULT_REMOTE_PORT: u16 = 10222;

/// Largest UDP payload over IPv4
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Configuration consumed by [`EngineProtocol`](crate::EngineProtocol)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Local address to bind
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// Local port to bind
    #[serde(default = "default_local_port")]
    pub local_port: u16,
    /// Port every remote host is reached on
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,
    /// Remote host names or addresses
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Largest payload accepted by `send` and read by `receive`
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
    /// Idle time after which a peer counts as disconnected
    #[serde(default = "default_disconnection_timeout_ms")]
    pub disconnection_timeout_ms: u64,
    /// RTT at or above which a connection floods
    #[serde(default = "default_flood_threshold_ms")]
    pub flood_threshold_ms: u64,
    /// Initial flood recovery period
    #[serde(default = "default_flood_period_ms")]
    pub flood_period_ms: u64,
    /// Cap for the flood recovery period
    #[serde(default = "default_flood_max_period_ms")]
    pub flood_max_period_ms: u64,
    /// Floor for the flood recovery period
    #[serde(default = "default_flood_min_period_ms")]
    pub flood_min_period_ms: u64,
    /// Good behaviour needed before the recovery period is halved
    #[serde(default = "default_flood_review_window_ms")]
    pub flood_review_window_ms: u64,
    /// RTT estimate update rule
    #[serde(default)]
    pub rtt_smoothing: RttSmoothing,
    /// Kernel send and receive buffer size, system default when unset
    #[serde(default)]
    pub socket_buffer_size: Option<usize>,
    /// Talk to more than one endpoint; not supported
    #[serde(default)]
    pub multiple_endpoints: bool,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_local_port() -> u16 {
    DEFAULT_LOCAL_PORT
}

fn default_remote_port() -> u16 {
    DEFAULT_REMOTE_PORT
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

fn default_disconnection_timeout_ms() -> u64 {
    10_000
}

fn default_flood_threshold_ms() -> u64 {
    DEFAULT_FLOOD_THRESHOLD.as_millis() as u64
}

fn default_flood_period_ms() -> u64 {
    DEFAULT_FLOOD_PERIOD.as_millis() as u64
}

fn default_flood_max_period_ms() -> u64 {
    MAX_FLOOD_PERIOD.as_millis() as u64
}

fn default_flood_min_period_ms() -> u64 {
    MIN_FLOOD_PERIOD.as_millis() as u64
}

fn default_flood_review_window_ms() -> u64 {
    DEFAULT_REVIEW_WINDOW.as_millis() as u64
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            bind_address: default_bind_address(),
            local_port: default_local_port(),
            remote_port: default_remote_port(),
            hosts: Vec::new(),
            max_payload_size: default_max_payload_size(),
            disconnection_timeout_ms: default_disconnection_timeout_ms(),
            flood_threshold_ms: default_flood_threshold_ms(),
            flood_period_ms: default_flood_period_ms(),
            flood_max_period_ms: default_flood_max_period_ms(),
            flood_min_period_ms: default_flood_min_period_ms(),
            flood_review_window_ms: default_flood_review_window_ms(),
            rtt_smoothing: RttSmoothing::default(),
            socket_buffer_size: None,
            multiple_endpoints: false,
        }
    }
}

impl ProtocolConfig {
    /// Configuration talking to a single host with default ports
    pub fn for_host(host: impl Into<String>) -> Self {
        ProtocolConfig {
            hosts: vec![host.into()],
            ..Self::default()
        }
    }

    /// Set the local port
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Set the remote port
    pub fn with_remote_port(mut self, port: u16) -> Self {
        self.remote_port = port;
        self
    }

    /// Set the bind address
    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Address the socket binds to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.local_port)
    }

    pub fn disconnection_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnection_timeout_ms)
    }

    pub fn flood_threshold(&self) -> Duration {
        Duration::from_millis(self.flood_threshold_ms)
    }

    /// Flood controller tuning derived from this configuration
    pub fn flood_config(&self) -> FloodConfig {
        FloodConfig {
            threshold: self.flood_threshold(),
            initial_period: Duration::from_millis(self.flood_period_ms),
            max_period: Duration::from_millis(self.flood_max_period_ms),
            min_period: Duration::from_millis(self.flood_min_period_ms),
            review_window: Duration::from_millis(self.flood_review_window_ms),
            smoothing: self.rtt_smoothing,
        }
    }

    /// Check the configuration before binding
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.multiple_endpoints {
            return Err(ProtocolError::Unsupported(
                "multiple endpoints are not supported".to_string(),
            ));
        }
        if self.hosts.len() > 1 {
            return Err(ProtocolError::Unsupported(format!(
                "{} hosts configured but multiple endpoints are not supported",
                self.hosts.len()
            )));
        }
        if HEADER_SIZE + self.max_payload_size > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::InvalidConfig(format!(
                "max_payload_size {} exceeds the {} bytes a datagram can carry",
                self.max_payload_size,
                MAX_DATAGRAM_SIZE - HEADER_SIZE
            )));
        }
        if self.disconnection_timeout_ms == 0 || self.flood_threshold_ms == 0 {
            return Err(ProtocolError::InvalidConfig(
                "disconnection_timeout_ms and flood_threshold_ms must be non-zero".to_string(),
            ));
        }
        if self.flood_min_period_ms > self.flood_max_period_ms {
            return Err(ProtocolError::InvalidConfig(format!(
                "flood_min_period_ms {} is larger than flood_max_period_ms {}",
                self.flood_min_period_ms, self.flood_max_period_ms
            )));
        }
        if self.flood_period_ms < self.flood_min_period_ms
            || self.flood_period_ms > self.flood_max_period_ms
        {
            return Err(ProtocolError::InvalidConfig(format!(
                "flood_period_ms {} is outside [{}, {}]",
                self.flood_period_ms, self.flood_min_period_ms, self.flood_max_period_ms
            )));
        }
        Ok(())
    }
}
