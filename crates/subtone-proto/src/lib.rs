//! Subtone wire format and bit-level primitives.
//!
//! This crate holds everything two peers must agree on byte-for-byte before
//! any cryptography happens: the packet header layout, the magic constants,
//! and the bit-packing helpers used by both the packet codec and the
//! steganographic embedder.
//!
//! Packet layout on the wire (big-endian integers):
//!
//! ```text
//! [SYNC: 3] [DATA_LENGTH: 4] [IV: 16] [EMISSION_ID: 8] [PACKET_ID: 8]
//! [DATA: DATA_LENGTH] [DIGEST: algorithm-dependent]
//! ```
//!
//! Parsing here is structural only: it validates the magic and field layout
//! and never touches keys, ciphers or digests. Authentication lives in
//! `subtone-crypto`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bitpack;
pub mod error;
pub mod header;

pub use error::WireError;
pub use header::{
    DATA_DIGEST_RATIO, DEFAULT_DATA_LEN, DEFAULT_IV, EMISSION_FIELD_LEN, HEADER_LEN, IV_LEN,
    LENGTH_FIELD_LEN, MAX_DIGEST_LEN, MIN_DIGEST_LEN, PACKET_FIELD_LEN, PacketHeader, SYNC_LEN,
    SYNC_MAGIC,
};
