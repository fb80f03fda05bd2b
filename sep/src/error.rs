use sep_io::SocketError;
use sep_protocol::PacketError;
use thiserror::Error;

/// Errors returned by [`EngineProtocol`](crate::EngineProtocol)
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Protocol is not initialized")]
    NotInitialized,

    #[error("Protocol is already initialized")]
    AlreadyInitialized,

    #[error("Could not resolve host {host}: {reason}")]
    Resolve { host: String, reason: String },

    #[error("Receive buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),
}
