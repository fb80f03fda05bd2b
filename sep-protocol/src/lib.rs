//! SEP Protocol Core Implementation
//!
//! This crate implements the core of the Simple Engine Protocol, a
//! connectionless, best-effort-reliable messaging protocol over UDP:
//! the packet header codec, sequence numbers, acknowledgement bookkeeping,
//! RTT estimation and flood detection. It performs no I/O.

pub mod ack;
pub mod congestion;
pub mod endpoint;
pub mod packet;
pub mod sequence;

pub use ack::{AckBitfield, AckSummary, Arrival, ReceiveWindow, SentLedger, ACK_WINDOW};
pub use congestion::{FloodConfig, FloodController, FloodState, FloodStats, FloodTransition, RttSmoothing};
pub use endpoint::{EndpointState, EndpointStats, ReceiveReport, DEFAULT_DISCONNECTION_TIMEOUT};
pub use packet::{Packet, PacketError, PacketHeader, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
pub use sequence::SeqNumber;
