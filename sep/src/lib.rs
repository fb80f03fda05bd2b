//! SEP - Simple Engine Protocol
//!
//! Connectionless messaging over UDP for game-engine style tick loops, with
//! acknowledgement tracking, round-trip estimation and flood detection.

pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;

pub use sep_io as io;
pub use sep_protocol as wire;

pub use config::{ProtocolConfig, DEFAULT_LOCAL_PORT, DEFAULT_REMOTE_PORT};
pub use error::ProtocolError;
pub use protocol::{EngineProtocol, Message};
pub use registry::{EndpointId, EndpointRegistry};

pub use sep_protocol::{
    EndpointStats, FloodState, FloodTransition, RttSmoothing, SeqNumber, HEADER_SIZE,
};
