//! Subtone cryptographic packet layer.
//!
//! Frames an arbitrary byte stream into self-describing, authenticated
//! packets and back. Every packet's keystream is bound to the
//! `(emission_id, packet_id)` pair through a derived 128-bit working key,
//! so replays across packets are detectable and keystreams never repeat.
//!
//! ```text
//! payload file ─► forward ─► [SYNC|LEN|IV|EMISSION|PACKET|DATA|DIGEST] ─► ring
//! ring ─► inverse ─► id checks ─► digest check ─► decrypt ─► payload file
//! ```
//!
//! The layer is synchronous and stateless between calls apart from the
//! session counters: it is driven from inside an audio codec's frame loop
//! and never blocks beyond one file read or write.
//!
//! # Security
//!
//! - Confidentiality and integrity only; packet boundaries and timing are
//!   visible to whoever can see the carrier.
//! - The digest covers every header field after SYNC plus the ciphertext;
//!   a wrong digest drops exactly one packet and the session continues.
//! - Secrets (master key, derived packet keys) are zeroed on drop.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algo;
pub mod channel;
pub mod cipher;
pub mod error;
pub mod key;
pub mod ring;
pub mod session;

pub use algo::{CipherAlgo, DigestAlgo};
pub use channel::{FORWARD_LOW_WATERMARK, InverseProgress, PayloadSource, forward, inverse};
pub use cipher::{Rc4Stream, packet_digest};
pub use error::CryptoError;
pub use key::{PacketKey, SecretKey};
pub use ring::RingBuffer;
pub use session::{CryptoConfig, CryptoSession, ParsedPacket, ProducedPacket};
