//! Structural packet header codec.
//!
//! The header is 39 bytes of fixed-layout big-endian fields. Parsing here
//! validates the SYNC magic and nothing else; id checks, key derivation and
//! digest verification happen a layer up where the session state lives.

use crate::{
    bitpack,
    error::WireError,
};

/// SYNC magic length in bytes.
pub const SYNC_LEN: usize = 3;

/// SYNC magic: three `0xFF` bytes open every packet.
pub const SYNC_MAGIC: [u8; SYNC_LEN] = [0xFF, 0xFF, 0xFF];

/// DATA_LENGTH field width in bytes.
pub const LENGTH_FIELD_LEN: usize = 4;

/// IV field width in bytes (128-bit).
pub const IV_LEN: usize = 16;

/// EMISSION_ID field width in bytes.
pub const EMISSION_FIELD_LEN: usize = 8;

/// PACKET_ID field width in bytes.
pub const PACKET_FIELD_LEN: usize = 8;

/// Total header length: SYNC + DATA_LENGTH + IV + EMISSION_ID + PACKET_ID.
pub const HEADER_LEN: usize =
    SYNC_LEN + LENGTH_FIELD_LEN + IV_LEN + EMISSION_FIELD_LEN + PACKET_FIELD_LEN;

/// Default payload size per packet, in bytes, before the digest-ratio cap.
pub const DEFAULT_DATA_LEN: usize = 512;

/// Shortest supported digest, in bytes (CRC24-class).
pub const MIN_DIGEST_LEN: usize = 3;

/// Longest supported digest, in bytes (SHA-512-class).
pub const MAX_DIGEST_LEN: usize = 64;

/// Payload bytes carried per digest byte: `max_data = digest_len * RATIO`.
pub const DATA_DIGEST_RATIO: usize = 16;

/// IV used when the session does not supply one.
pub const DEFAULT_IV: [u8; IV_LEN] = [
    0x0A, 0x1B, 0x2C, 0x3D, 0x4E, 0x5F, 0x6A, 0x7B, 0x0A, 0x1B, 0x2C, 0x3D, 0x4E, 0x5F, 0x6A,
    0x7B,
];

const LENGTH_OFFSET: usize = SYNC_LEN;
const IV_OFFSET: usize = LENGTH_OFFSET + LENGTH_FIELD_LEN;
const EMISSION_OFFSET: usize = IV_OFFSET + IV_LEN;
const PACKET_OFFSET: usize = EMISSION_OFFSET + EMISSION_FIELD_LEN;

/// Decoded packet header fields.
///
/// A packet id of 0 is the end-of-stream sentinel; the session layer treats
/// it as terminal. This type does not enforce that — it is pure structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Length of the DATA field in bytes.
    pub data_len: u32,
    /// Per-packet initialization vector, reinstalled by the receiver.
    pub iv: [u8; IV_LEN],
    /// Emission (session) identifier.
    pub emission: u64,
    /// Packet sequence number; 0 terminates the stream.
    pub packet: u64,
}

impl PacketHeader {
    /// Serialize the header, SYNC magic included, into the front of `out`.
    ///
    /// Returns [`HEADER_LEN`] on success.
    ///
    /// # Errors
    ///
    /// - `WireError::BufferTooSmall` when `out` cannot hold the header.
    pub fn write_to(&self, out: &mut [u8]) -> Result<usize, WireError> {
        if out.len() < HEADER_LEN {
            return Err(WireError::BufferTooSmall { needed: HEADER_LEN, actual: out.len() });
        }
        out[..SYNC_LEN].copy_from_slice(&SYNC_MAGIC);
        bitpack::write_u32_be(out, LENGTH_OFFSET, self.data_len)?;
        out[IV_OFFSET..IV_OFFSET + IV_LEN].copy_from_slice(&self.iv);
        bitpack::write_u64_be(out, EMISSION_OFFSET, self.emission)?;
        bitpack::write_u64_be(out, PACKET_OFFSET, self.packet)?;
        Ok(HEADER_LEN)
    }

    /// Parse a header from the front of `buf`.
    ///
    /// # Errors
    ///
    /// - `WireError::BadSync { skip }` when the SYNC magic does not match;
    ///   `skip` is the first mismatching position plus one, so the caller
    ///   can discard that many bytes and resynchronize.
    /// - `WireError::BufferTooSmall` when fewer than [`HEADER_LEN`] bytes
    ///   are available.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        for (i, expected) in SYNC_MAGIC.iter().enumerate() {
            match buf.get(i) {
                Some(b) if b == expected => {},
                Some(_) => return Err(WireError::BadSync { skip: i + 1 }),
                None => {
                    return Err(WireError::BufferTooSmall {
                        needed: HEADER_LEN,
                        actual: buf.len(),
                    });
                },
            }
        }
        if buf.len() < HEADER_LEN {
            return Err(WireError::BufferTooSmall { needed: HEADER_LEN, actual: buf.len() });
        }

        let data_len = bitpack::read_u32_be(buf, LENGTH_OFFSET)?;
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&buf[IV_OFFSET..IV_OFFSET + IV_LEN]);
        let emission = bitpack::read_u64_be(buf, EMISSION_OFFSET)?;
        let packet = bitpack::read_u64_be(buf, PACKET_OFFSET)?;

        Ok(Self { data_len, iv, emission, packet })
    }
}
