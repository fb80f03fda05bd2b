//! Acknowledgement bookkeeping
//!
//! SEP never sends dedicated ACK packets. Every datagram piggybacks the
//! newest sequence number its sender has received plus a 32-bit history of
//! the messages before it. This module holds both sides of that exchange:
//!
//! - [`ReceiveWindow`] tracks what *we* received from a peer and produces the
//!   values written into our outgoing headers.
//! - [`SentLedger`] tracks what *we* sent, so the peer's echoed values can be
//!   turned into send times (for RTT), acknowledgements and losses.

use crate::sequence::SeqNumber;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// Number of messages covered by an ack bitfield
pub const ACK_WINDOW: u32 = 32;

/// Maximum number of outstanding sent records kept per endpoint
pub const MAX_OUTSTANDING: usize = 1024;

/// 32-bit receipt history
///
/// Bit `k` refers to the message `k + 1` places before the newest one.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct AckBitfield(u32);

impl AckBitfield {
    pub const EMPTY: AckBitfield = AckBitfield(0);
    pub const ALL: AckBitfield = AckBitfield(u32::MAX);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        AckBitfield(raw)
    }

    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Check bit `index`; indices outside the window are never set
    #[inline]
    pub fn is_set(self, index: u32) -> bool {
        index < ACK_WINDOW && (self.0 >> index) & 1 == 1
    }

    /// Set bit `index`, returning false if it lies outside the window
    #[inline]
    pub fn set(&mut self, index: u32) -> bool {
        if index >= ACK_WINDOW {
            return false;
        }
        self.0 |= 1 << index;
        true
    }

    /// Slide the window forward by `count` positions, dropping the oldest history
    #[inline]
    pub fn shift(&mut self, count: u32) {
        self.0 = if count >= ACK_WINDOW {
            0
        } else {
            self.0 << count
        };
    }

    /// Number of messages recorded in the history
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl fmt::Debug for AckBitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AckBitfield({:#034b})", self.0)
    }
}

/// How an incoming sequence number relates to what was already seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// First message ever received from this peer
    First,
    /// Newer than anything seen before; the window advanced by this many places
    Newest { advanced_by: u32 },
    /// Older than the newest message, recorded in the history
    Late,
    /// Same as the newest message
    Duplicate,
    /// Older than the 32-message history can express
    OutOfWindow,
}

/// Remote sequence number plus ack bitfield for one peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveWindow {
    remote_seq: SeqNumber,
    ack_bits: AckBitfield,
}

impl ReceiveWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest sequence number received, or [`SeqNumber::NONE`]
    pub fn remote_seq(&self) -> SeqNumber {
        self.remote_seq
    }

    pub fn ack_bits(&self) -> AckBitfield {
        self.ack_bits
    }

    /// Record receipt of `seq`
    ///
    /// A strictly newer number becomes the remote sequence number and shifts
    /// the history. Every other case only sets a history bit, so the remote
    /// sequence number never moves backwards.
    pub fn record(&mut self, seq: SeqNumber) -> Arrival {
        let previous = self.remote_seq;
        if previous.is_none() {
            if seq.is_none() {
                return Arrival::Duplicate;
            }
            self.remote_seq = seq;
            return Arrival::First;
        }

        let delta = previous.distance_to(seq);
        if delta == 0 {
            return Arrival::Duplicate;
        }

        if delta > 0 {
            self.remote_seq = seq;
            self.ack_bits.shift(delta as u32);
        }

        // Newer: the bit marks the previous newest. Older: it marks `seq` itself.
        let recorded = self.ack_bits.set(delta.unsigned_abs() - 1);

        if delta > 0 {
            Arrival::Newest {
                advanced_by: delta as u32,
            }
        } else if recorded {
            Arrival::Late
        } else {
            Arrival::OutOfWindow
        }
    }

    /// Whether `seq` is known to have been received
    ///
    /// Only the newest message and the 32 before it can be answered; anything
    /// older, anything newer, and the reserved value 0 report false.
    pub fn contains(&self, seq: SeqNumber) -> bool {
        if seq.is_none() || self.remote_seq.is_none() {
            return false;
        }
        if seq == self.remote_seq {
            return true;
        }

        let behind = seq.distance_to(self.remote_seq);
        behind > 0 && self.ack_bits.is_set(behind as u32 - 1)
    }
}

#[derive(Debug, Clone, Copy)]
struct SentRecord {
    seq: SeqNumber,
    sent_at: Instant,
    acked: bool,
}

/// Result of applying a peer's ack fields to the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckSummary {
    /// Messages acknowledged for the first time
    pub newly_acked: u32,
    /// Messages that left the ack window without being acknowledged
    pub lost: u32,
}

/// Send times and delivery state of outgoing messages for one peer
#[derive(Debug, Clone)]
pub struct SentLedger {
    records: VecDeque<SentRecord>,
    capacity: usize,
}

impl SentLedger {
    pub fn new() -> Self {
        Self::with_capacity(MAX_OUTSTANDING)
    }

    /// Create a ledger that holds at most `capacity` records
    pub fn with_capacity(capacity: usize) -> Self {
        SentLedger {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record that `seq` was sent at `now`
    ///
    /// Returns the number of unacknowledged records evicted to stay within
    /// capacity; those count as lost.
    pub fn record_send(&mut self, seq: SeqNumber, now: Instant) -> u32 {
        self.records.push_back(SentRecord {
            seq,
            sent_at: now,
            acked: false,
        });

        let mut lost = 0;
        while self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                if !evicted.acked {
                    lost += 1;
                }
            }
        }
        lost
    }

    /// Send time of `seq`, if still held
    pub fn sent_at(&self, seq: SeqNumber) -> Option<Instant> {
        self.find(seq).map(|record| record.sent_at)
    }

    /// Whether the peer has acknowledged `seq`
    pub fn is_acked(&self, seq: SeqNumber) -> bool {
        self.find(seq).map_or(false, |record| record.acked)
    }

    /// Apply the peer's echoed sequence number and history
    ///
    /// Marks every covered message as acknowledged, then drops records that
    /// have fallen behind the window, counting unacknowledged ones as lost.
    pub fn apply_ack(&mut self, ack: SeqNumber, ack_bits: AckBitfield) -> AckSummary {
        let mut summary = AckSummary::default();
        if ack.is_none() {
            return summary;
        }

        for record in self.records.iter_mut() {
            let behind = record.seq.distance_to(ack);
            let covered = match behind {
                0 => true,
                b if b > 0 => ack_bits.is_set(b as u32 - 1),
                _ => false,
            };
            if covered && !record.acked {
                record.acked = true;
                summary.newly_acked += 1;
            }
        }

        while let Some(front) = self.records.front() {
            if front.seq.distance_to(ack) <= ACK_WINDOW as i32 {
                break;
            }
            if !front.acked {
                summary.lost += 1;
            }
            self.records.pop_front();
        }

        summary
    }

    fn find(&self, seq: SeqNumber) -> Option<&SentRecord> {
        let front = self.records.front()?;
        // Sends are consecutive, so the offset from the oldest record is the index.
        let offset = front.seq.distance_to(seq);
        if offset < 0 {
            return None;
        }
        self.records
            .get(offset as usize)
            .filter(|record| record.seq == seq)
            .or_else(|| self.records.iter().find(|record| record.seq == seq))
    }
}

impl Default for SentLedger {
    fn default() -> Self {
        Self::new()
    }
}
