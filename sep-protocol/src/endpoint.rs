//! Per-endpoint protocol state
//!
//! One [`EndpointState`] exists for every peer a protocol instance talks to.
//! It owns the outgoing sequence counter, the receive window, the sent-message
//! ledger and the flood controller, and turns a validated incoming header
//! into updates of all of them.

use crate::ack::{AckSummary, Arrival, ReceiveWindow, SentLedger};
use crate::congestion::{FloodConfig, FloodController, FloodState, FloodTransition};
use crate::packet::PacketHeader;
use crate::sequence::SeqNumber;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Default idle time after which a peer counts as disconnected
pub const DEFAULT_DISCONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoint statistics
#[derive(Debug, Clone)]
pub struct EndpointStats {
    /// Configured host name
    pub host: String,
    /// Resolved address
    pub addr: SocketAddr,
    /// Next outgoing sequence number
    pub local_seq: SeqNumber,
    /// Newest sequence number received
    pub remote_seq: SeqNumber,
    /// Total messages sent
    pub messages_sent: u64,
    /// Total messages received
    pub messages_received: u64,
    /// Total payload bytes sent
    pub bytes_sent: u64,
    /// Total payload bytes received
    pub bytes_received: u64,
    /// Messages the peer acknowledged
    pub messages_acked: u64,
    /// Messages that left the ack window unacknowledged
    pub messages_lost: u64,
    /// Smoothed round-trip time
    pub rtt: Duration,
    /// Flood state
    pub flood_state: FloodState,
    /// Current flood recovery period
    pub flood_period: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    messages_sent: u64,
    messages_received: u64,
    bytes_sent: u64,
    bytes_received: u64,
    messages_acked: u64,
    messages_lost: u64,
}

/// Everything learned from one accepted datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveReport {
    /// How the sequence number related to earlier ones
    pub arrival: Arrival,
    /// RTT sample taken from the echoed sequence number, if any
    pub rtt_sample: Option<Duration>,
    /// Flood state change caused by the sample
    pub flood: FloodTransition,
    /// Delivery updates for our own messages
    pub acks: AckSummary,
}

/// Protocol state for one peer
#[derive(Debug, Clone)]
pub struct EndpointState {
    host: String,
    addr: SocketAddr,
    local_seq: SeqNumber,
    window: ReceiveWindow,
    ledger: SentLedger,
    flood: FloodController,
    last_receipt: Instant,
    counters: Counters,
}

impl EndpointState {
    /// Create fresh state: nothing sent or received, no RTT estimate, not
    /// flooded, all timestamps at `now`
    pub fn new(host: impl Into<String>, addr: SocketAddr, flood: &FloodConfig, now: Instant) -> Self {
        EndpointState {
            host: host.into(),
            addr,
            local_seq: SeqNumber::FIRST,
            window: ReceiveWindow::new(),
            ledger: SentLedger::new(),
            flood: FloodController::new(flood, now),
            last_receipt: now,
            counters: Counters::default(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Sequence number the next outgoing message will carry
    pub fn local_seq(&self) -> SeqNumber {
        self.local_seq
    }

    /// Newest sequence number received from the peer
    pub fn remote_seq(&self) -> SeqNumber {
        self.window.remote_seq()
    }

    pub fn window(&self) -> &ReceiveWindow {
        &self.window
    }

    pub fn flood(&self) -> &FloodController {
        &self.flood
    }

    pub fn last_receipt(&self) -> Instant {
        self.last_receipt
    }

    /// Build the header for the next outgoing message and advance the counter
    ///
    /// The header carries the pre-increment sequence number. The counter
    /// skips the reserved 0 when it wraps.
    pub fn next_header(&mut self) -> PacketHeader {
        let seq = self.local_seq;
        self.local_seq.increment();
        if self.local_seq.is_none() {
            self.local_seq.increment();
        }
        PacketHeader::new(seq, self.window.remote_seq(), self.window.ack_bits())
    }

    /// Record a successful transmission of `seq`
    pub fn on_sent(&mut self, seq: SeqNumber, payload_len: usize, now: Instant) {
        let evicted = self.ledger.record_send(seq, now);
        self.counters.messages_sent += 1;
        self.counters.bytes_sent += payload_len as u64;
        self.counters.messages_lost += u64::from(evicted);
    }

    /// Apply a validated incoming header
    pub fn on_receive(
        &mut self,
        header: &PacketHeader,
        payload_len: usize,
        now: Instant,
        flood_config: &FloodConfig,
    ) -> ReceiveReport {
        let arrival = self.window.record(header.seq);
        self.last_receipt = now;
        self.counters.messages_received += 1;
        self.counters.bytes_received += payload_len as u64;

        let mut rtt_sample = None;
        let mut flood = FloodTransition::Steady;
        if !header.ack.is_none() {
            match self.ledger.sent_at(header.ack) {
                Some(sent_at) => {
                    let sample = now.saturating_duration_since(sent_at);
                    flood = self.flood.on_rtt_sample(sample, now, flood_config);
                    rtt_sample = Some(sample);
                    tracing::trace!(
                        host = %self.host,
                        ack = %header.ack,
                        sample_us = sample.as_micros() as u64,
                        rtt_us = self.flood.rtt().as_micros() as u64,
                        "RTT sample"
                    );
                }
                None => {
                    tracing::trace!(host = %self.host, ack = %header.ack, "No send time for echoed sequence");
                }
            }
        }

        match flood {
            FloodTransition::Entered => tracing::info!(
                host = %self.host,
                rtt_ms = self.flood.rtt().as_millis() as u64,
                period_ms = self.flood.period().as_millis() as u64,
                "Connection flooded"
            ),
            FloodTransition::Recovering => tracing::debug!(
                host = %self.host,
                rtt_ms = self.flood.rtt().as_millis() as u64,
                "RTT back under flood threshold"
            ),
            FloodTransition::Exited => tracing::info!(
                host = %self.host,
                rtt_ms = self.flood.rtt().as_millis() as u64,
                period_ms = self.flood.period().as_millis() as u64,
                "Connection recovered from flood"
            ),
            FloodTransition::Steady => {}
        }

        let acks = self.ledger.apply_ack(header.ack, header.ack_bits);
        self.counters.messages_acked += u64::from(acks.newly_acked);
        self.counters.messages_lost += u64::from(acks.lost);

        ReceiveReport {
            arrival,
            rtt_sample,
            flood,
            acks,
        }
    }

    /// Whether a message arrived less than `timeout` ago
    pub fn is_connected(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_receipt) < timeout
    }

    pub fn is_flooded(&self) -> bool {
        self.flood.is_flooded()
    }

    /// Whether the peer's message `seq` was received
    pub fn received(&self, seq: SeqNumber) -> bool {
        self.window.contains(seq)
    }

    /// Whether the peer acknowledged our message `seq`
    pub fn acknowledged(&self, seq: SeqNumber) -> bool {
        self.ledger.is_acked(seq)
    }

    /// Get endpoint statistics
    pub fn stats(&self) -> EndpointStats {
        let flood = self.flood.stats();
        EndpointStats {
            host: self.host.clone(),
            addr: self.addr,
            local_seq: self.local_seq,
            remote_seq: self.window.remote_seq(),
            messages_sent: self.counters.messages_sent,
            messages_received: self.counters.messages_received,
            bytes_sent: self.counters.bytes_sent,
            bytes_received: self.counters.bytes_received,
            messages_acked: self.counters.messages_acked,
            messages_lost: self.counters.messages_lost,
            rtt: flood.rtt,
            flood_state: flood.state,
            flood_period: flood.period,
        }
    }
}
