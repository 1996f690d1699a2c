//! Property-based tests for the structural header codec.

use proptest::prelude::*;
use subtone_proto::{HEADER_LEN, PacketHeader, WireError};

fn arbitrary_header() -> impl Strategy<Value = PacketHeader> {
    (any::<u32>(), any::<[u8; 16]>(), any::<u64>(), any::<u64>())
        .prop_map(|(data_len, iv, emission, packet)| PacketHeader { data_len, iv, emission, packet })
}

#[test]
fn prop_header_round_trip() {
    proptest!(|(header in arbitrary_header())| {
        let mut wire = [0u8; HEADER_LEN];
        header.write_to(&mut wire).expect("header fits");

        let parsed = PacketHeader::parse(&wire).expect("valid header parses");
        prop_assert_eq!(parsed, header);
    });
}

#[test]
fn prop_corrupted_sync_is_rejected_with_skip() {
    proptest!(|(header in arbitrary_header(), pos in 0usize..3, bad in 0u8..0xFF)| {
        let mut wire = [0u8; HEADER_LEN];
        header.write_to(&mut wire).expect("header fits");

        // Any value other than 0xFF breaks the magic at `pos`; the skip
        // count points one past the first mismatch.
        wire[pos] = bad;
        prop_assert_eq!(PacketHeader::parse(&wire), Err(WireError::BadSync { skip: pos + 1 }));
    });
}
