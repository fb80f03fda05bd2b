//! Property-based tests for the SEP wire codec and receive window
//!
//! These tests use proptest to generate random headers, byte strings and
//! arrival orders and check the invariants that must hold for all of them.

use bytes::Bytes;
use proptest::prelude::*;
use sep_protocol::packet::{encode, Packet, PacketError, PacketHeader, HEADER_SIZE};
use sep_protocol::{AckBitfield, ReceiveWindow, SeqNumber, ACK_WINDOW};
use std::collections::HashSet;

// Property test strategies

fn seq_number_strategy() -> impl Strategy<Value = SeqNumber> {
    any::<u32>().prop_map(SeqNumber::new)
}

fn header_strategy() -> impl Strategy<Value = PacketHeader> {
    (seq_number_strategy(), seq_number_strategy(), any::<u32>()).prop_map(|(seq, ack, bits)| {
        PacketHeader::new(seq, ack, AckBitfield::from_raw(bits))
    })
}

fn payload_strategy() -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=256).prop_map(Bytes::from)
}

/// Starting points with and without a wrap through zero
fn base_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![Just(1u32), Just(u32::MAX - 60), 1u32..1_000_000]
}

/// Arrival order as offsets from a base, duplicates and reordering included
fn arrivals_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..150, 1..120)
}

// Property tests

proptest! {
    #[test]
    fn prop_packet_roundtrip(header in header_strategy(), payload in payload_strategy()) {
        let packet = Packet::new(header, payload.clone());
        let bytes = packet.to_bytes();

        prop_assert_eq!(bytes.len(), HEADER_SIZE + payload.len());
        let parsed = Packet::from_bytes(&bytes).unwrap();
        prop_assert_eq!(parsed.header, header);
        prop_assert_eq!(parsed.payload, payload);
    }

    #[test]
    fn prop_encode_respects_limit(header in header_strategy(), len in 0usize..512, max in 0usize..512) {
        let payload = vec![0xAB; len];
        let result = encode(&header, &payload, max);

        if len > max {
            prop_assert_eq!(result.unwrap_err(), PacketError::PayloadTooLarge { size: len, max });
        } else {
            let bytes = result.unwrap();
            prop_assert_eq!(PacketHeader::from_bytes(&bytes).unwrap(), header);
        }
    }

    #[test]
    fn prop_foreign_protocol_rejected(protocol_id in any::<u32>(), rest in prop::collection::vec(any::<u8>(), 12..64)) {
        prop_assume!(protocol_id != PacketHeader::PROTOCOL_ID);
        let mut datagram = protocol_id.to_le_bytes().to_vec();
        datagram.extend_from_slice(&rest);

        let is_mismatch = matches!(
            PacketHeader::from_bytes(&datagram),
            Err(PacketError::ProtocolMismatch { .. })
        );
        prop_assert!(is_mismatch);
    }

    #[test]
    fn prop_short_datagram_rejected(data in prop::collection::vec(any::<u8>(), 0..HEADER_SIZE)) {
        prop_assert_eq!(
            PacketHeader::from_bytes(&data),
            Err(PacketError::InsufficientData { expected: HEADER_SIZE, actual: data.len() })
        );
    }

    #[test]
    fn prop_from_bytes_never_panics(data in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = PacketHeader::from_bytes(&data);
        let _ = Packet::from_bytes(&data);
    }

    #[test]
    fn prop_window_reports_exactly_recent_receipts(base in base_strategy(), offsets in arrivals_strategy()) {
        let to_seq = |offset: u32| SeqNumber::new(base.wrapping_add(offset));
        let offsets: Vec<u32> = offsets
            .into_iter()
            .filter(|&offset| !to_seq(offset).is_none())
            .collect();
        prop_assume!(!offsets.is_empty());

        let mut window = ReceiveWindow::new();
        let mut delivered = HashSet::new();
        let mut newest = offsets[0];
        for &offset in &offsets {
            window.record(to_seq(offset));
            delivered.insert(offset);
            newest = newest.max(offset);

            // The remote sequence number only ever moves forward.
            prop_assert_eq!(window.remote_seq(), to_seq(newest));
        }

        let oldest = newest.saturating_sub(ACK_WINDOW);
        for offset in oldest..=newest {
            if to_seq(offset).is_none() {
                continue;
            }
            prop_assert_eq!(
                window.contains(to_seq(offset)),
                delivered.contains(&offset),
                "offset {} (newest {})", offset, newest
            );
        }
        for offset in newest + 1..newest + 40 {
            prop_assert!(!window.contains(to_seq(offset)));
        }
    }

    #[test]
    fn prop_history_never_exceeds_window(offsets in arrivals_strategy()) {
        let mut window = ReceiveWindow::new();
        for &offset in &offsets {
            window.record(SeqNumber::new(offset + 1));
            prop_assert!(window.ack_bits().count() <= ACK_WINDOW);
        }

        let newest = window.remote_seq();
        for behind in ACK_WINDOW + 1..ACK_WINDOW + 100 {
            let old = newest - behind;
            if !old.is_none() {
                prop_assert!(!window.contains(old));
            }
        }
    }

    #[test]
    fn prop_seq_distance_antisymmetric(a in seq_number_strategy(), b in seq_number_strategy()) {
        let forward = a.distance_to(b);
        let backward = b.distance_to(a);
        prop_assert_eq!(forward.wrapping_add(backward), 0);
        if forward > 0 {
            prop_assert!(a.precedes(b));
            prop_assert!(b.follows(a));
        }
    }
}
