//! Forward and inverse drivers of the cryptographic layer.
//!
//! `forward` keeps the ring topped up on the sender: it reads payload bytes
//! at the current source offset, packs them into one authenticated packet
//! and appends it to the ring. `inverse` drains the receiver's ring one
//! packet at a time into the payload sink. Both are synchronous and do at
//! most one file operation per call, matching the codec's frame cadence.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::{
    error::CryptoError,
    ring::RingBuffer,
    session::CryptoSession,
};

/// Ring level below which `forward` produces another packet.
///
/// A stego frame's size field describes at most 255 payload bits, so a
/// ring holding this many bytes always outlasts the frame.
pub const FORWARD_LOW_WATERMARK: usize = 255;

/// Seekable payload source with a running offset.
///
/// The offset only advances by the bytes actually packed into packets, so
/// payload that did not fit is re-read on the next call.
#[derive(Debug)]
pub struct PayloadSource<R> {
    reader: R,
    offset: u64,
    len: u64,
}

impl<R: Read + Seek> PayloadSource<R> {
    /// Wrap a reader, measuring its total length once.
    ///
    /// # Errors
    ///
    /// - `CryptoError::Io` when the reader cannot seek.
    pub fn new(mut reader: R) -> Result<Self, CryptoError> {
        let len = reader.seek(SeekFrom::End(0))?;
        Ok(Self { reader, offset: 0, len })
    }

    /// Total payload length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the source holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether every byte has been packed into a packet.
    pub fn exhausted(&self) -> bool {
        self.offset >= self.len
    }

    fn read_at_offset(&mut self, buf: &mut [u8]) -> Result<usize, CryptoError> {
        self.reader.seek(SeekFrom::Start(self.offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

/// Progress report from one [`inverse`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InverseProgress {
    /// Ring bytes consumed (a whole packet, or 0 when more are needed).
    pub consumed: usize,
    /// Plaintext bytes delivered to the sink.
    pub delivered: usize,
    /// The terminal packet was consumed by this call.
    pub end_of_stream: bool,
}

/// Top up the sender ring with one more packet when it runs low.
///
/// No-op when the ring still holds at least [`FORWARD_LOW_WATERMARK`] bytes
/// or the stream is already terminal. Reads up to `requested` bytes (0 or
/// anything above the session default selects the default), flags the
/// session terminal when the source is exhausted by this read, produces the
/// packet and advances the offset by the bytes actually packed.
///
/// Returns the number of payload bytes newly committed to the ring.
///
/// # Errors
///
/// - `CryptoError::InvalidArgument` when the source is empty.
/// - `CryptoError::Io` on source failures, plus any packetizer error.
pub fn forward<R: Read + Seek>(
    session: &mut CryptoSession,
    ring: &mut RingBuffer,
    source: &mut PayloadSource<R>,
    requested: usize,
) -> Result<usize, CryptoError> {
    if ring.len() >= FORWARD_LOW_WATERMARK || session.is_drained() {
        return Ok(0);
    }

    let default_len = session.default_data_len();
    let effective = if requested == 0 || requested > default_len { default_len } else { requested };

    let mut chunk = vec![0u8; effective];
    let n = source.read_at_offset(&mut chunk)?;
    if n == 0 {
        return Err(CryptoError::InvalidArgument("payload source is empty"));
    }

    // Reaching the end of the source makes this packet the stream's last:
    // it must carry the terminal id.
    if source.offset + n as u64 >= source.len {
        session.mark_final();
    }

    let mut packet = vec![0u8; session.max_packet_len()];
    let produced = session.produce_packet(&chunk[..n], &mut packet)?;
    ring.append(&packet[..produced.packet_len])?;
    source.offset += produced.data_written as u64;

    debug!(
        bytes = produced.data_written,
        offset = source.offset,
        ring = ring.len(),
        "forward packed payload"
    );

    Ok(produced.data_written)
}

/// Drain one packet from the receiver ring into the payload sink.
///
/// Ok with `consumed == 0` means the ring does not yet hold a complete
/// packet. A `BadMessage` or `CheckFail` drops the offending bytes from the
/// ring before propagating, so the caller can simply retry.
///
/// # Errors
///
/// - `CryptoError::BadMessage` / `CryptoError::CheckFail` after discarding
///   the damaged bytes.
/// - `CryptoError::Io` when the sink write fails.
pub fn inverse<W: Write>(
    session: &mut CryptoSession,
    ring: &mut RingBuffer,
    sink: &mut W,
) -> Result<InverseProgress, CryptoError> {
    let mut plain = Vec::new();
    match session.parse_packet(ring.as_slice(), &mut plain) {
        Ok(parsed) if parsed.consumed == 0 => {
            Ok(InverseProgress { consumed: 0, delivered: 0, end_of_stream: false })
        },
        Ok(parsed) => {
            sink.write_all(&plain)?;
            ring.drain_front(parsed.consumed);
            debug!(bytes = plain.len(), "inverse delivered payload");
            Ok(InverseProgress {
                consumed: parsed.consumed,
                delivered: plain.len(),
                end_of_stream: parsed.end_of_stream,
            })
        },
        Err(CryptoError::BadMessage { discard, reason }) => {
            if discard > 0 {
                ring.drain_front(discard);
            }
            Err(CryptoError::BadMessage { discard, reason })
        },
        Err(CryptoError::CheckFail { discard }) => {
            ring.drain_front(discard);
            Err(CryptoError::CheckFail { discard })
        },
        Err(err) => Err(err),
    }
}
