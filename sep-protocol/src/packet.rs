//! SEP Packet Structures and Serialization
//!
//! Every datagram is a fixed 128-bit (16-byte) header followed by an opaque
//! payload:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Protocol ID                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Remote Sequence Number                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Ack Bitfield                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Payload ...                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! All fields are little-endian.

use crate::ack::AckBitfield;
use crate::sequence::SeqNumber;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the SEP packet header in bytes (4 fields × 4 bytes each)
pub const HEADER_SIZE: usize = 16;

/// Default upper bound on payload length
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 1024;

/// Base value of the protocol identifier
pub const PROTOCOL_BASE: u32 = 0x5345_5000;

/// Wire format revision, added to [`PROTOCOL_BASE`]
pub const PROTOCOL_VERSION: u32 = 1;

/// Fixed 16-byte packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Sender's local sequence number for this datagram
    pub seq: SeqNumber,
    /// Sender's most recently received remote sequence number (implicit ack)
    pub ack: SeqNumber,
    /// Bit k set: the sender received our message `ack - k - 1`
    pub ack_bits: AckBitfield,
}

impl PacketHeader {
    /// Identifier every valid datagram starts with
    pub const PROTOCOL_ID: u32 = PROTOCOL_BASE + PROTOCOL_VERSION;

    pub fn new(seq: SeqNumber, ack: SeqNumber, ack_bits: AckBitfield) -> Self {
        PacketHeader { seq, ack, ack_bits }
    }

    /// Parse and validate a header
    ///
    /// Fails if fewer than [`HEADER_SIZE`] bytes are available or if the
    /// protocol identifier does not match [`PacketHeader::PROTOCOL_ID`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PacketError::InsufficientData {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let protocol_id = buf.get_u32_le();
        if protocol_id != Self::PROTOCOL_ID {
            return Err(PacketError::ProtocolMismatch {
                expected: Self::PROTOCOL_ID,
                actual: protocol_id,
            });
        }

        Ok(PacketHeader {
            seq: SeqNumber::new(buf.get_u32_le()),
            ack: SeqNumber::new(buf.get_u32_le()),
            ack_bits: AckBitfield::from_raw(buf.get_u32_le()),
        })
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(Self::PROTOCOL_ID);
        buf.put_u32_le(self.seq.as_raw());
        buf.put_u32_le(self.ack.as_raw());
        buf.put_u32_le(self.ack_bits.as_raw());
    }
}

/// A header plus its opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(header: PacketHeader, payload: Bytes) -> Self {
        Packet { header, payload }
    }

    /// Total size of the packet (header + payload)
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        self.header.to_bytes(&mut buf);
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse a packet from a received datagram
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::from_bytes(bytes)?;
        let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..]);
        Ok(Packet { header, payload })
    }
}

/// Encode a header and borrowed payload in one allocation
///
/// Fails if the payload exceeds `max_payload`.
pub fn encode(
    header: &PacketHeader,
    payload: &[u8],
    max_payload: usize,
) -> Result<BytesMut, PacketError> {
    check_payload_len(payload.len(), max_payload)?;
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    header.to_bytes(&mut buf);
    buf.put_slice(payload);
    Ok(buf)
}

/// Reject payloads larger than the configured maximum
pub fn check_payload_len(size: usize, max: usize) -> Result<(), PacketError> {
    if size > max {
        return Err(PacketError::PayloadTooLarge { size, max });
    }
    Ok(())
}

/// Packet parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Protocol mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ProtocolMismatch { expected: u32, actual: u32 },

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}
