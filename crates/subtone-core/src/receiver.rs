//! Receiver-side per-frame driver.
//!
//! Mirrors the sender frame by frame: derive the same subkeys, read the
//! presence signal, rebuild the lineup, pull the subliminal bits out of
//! the residue, and hand whole bytes to the cryptographic layer. Bits that
//! do not fill a byte carry over to the next frame, exactly matching the
//! sender's `sent % 8` accounting.

use std::io::Write;

use subtone_crypto::{CryptoConfig, CryptoError, CryptoSession, RingBuffer, inverse};
use subtone_proto::bitpack;
use tracing::{debug, trace};

use crate::{
    config::SessionConfig,
    embed::{BitBuffer, extract_subliminal},
    error::StegoError,
    frame::FloorLayout,
    state::StegoState,
    sync::{self, SyncMethod},
};

/// What one frame yielded on the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// The frame carried no subliminal data.
    Empty,
    /// Subliminal bytes reached the crypto layer; `delivered` payload
    /// bytes made it through to the sink (0 while a packet is partial).
    Data {
        /// Plaintext bytes written to the sink by this frame.
        delivered: usize,
    },
    /// The terminal packet was consumed; the session is done.
    EndOfStream,
}

/// One receiving peer: steganographic state plus its cryptographic session
/// and payload sink.
pub struct ReceiverSession<W> {
    state: StegoState,
    crypto: CryptoSession,
    ring: RingBuffer,
    sink: W,
    carry: u8,
    carry_len: usize,
    end_reported: bool,
}

impl<W: Write> ReceiverSession<W> {
    /// Open a receiving session writing recovered payload into `sink`.
    ///
    /// # Errors
    ///
    /// - `StegoError::InvalidArgument` for out-of-range configuration.
    /// - Crypto-layer errors for rejected algorithms or keys.
    pub fn new(config: &SessionConfig, sink: W) -> Result<Self, StegoError> {
        let state = StegoState::new(config)?;
        let crypto = CryptoSession::new(&CryptoConfig {
            cipher_name: config.cipher_name.as_deref(),
            digest_name: config.digest_name.as_deref(),
            hmac: config.hmac,
            key: &config.key,
            iv: config.iv,
            emission: config.emission,
            packet: config.packet,
            default_data_len: config.default_data_len,
        })?;
        let ring = RingBuffer::with_capacity(crypto.max_packet_len() * 2);

        Ok(Self {
            state,
            crypto,
            ring,
            sink,
            carry: 0,
            carry_len: 0,
            end_reported: false,
        })
    }

    /// Whether the terminal packet has been consumed.
    pub fn finished(&self) -> bool {
        self.end_reported
    }

    /// Pure payload bits recovered so far.
    pub fn bits_read(&self) -> u64 {
        self.state.bits_read()
    }

    /// Give back the sink, consuming the session.
    pub fn into_sink(self) -> W {
        self.sink
    }

    /// Process one frame and channel.
    ///
    /// # Errors
    ///
    /// - Crypto-layer I/O errors from the sink. Damaged packets are
    ///   discarded internally and do not surface here.
    pub fn extract_frame(
        &mut self,
        layout: &FloorLayout<'_>,
        posts: &[i32],
        floor: &[i32],
        residue: &[i32],
    ) -> Result<ExtractOutcome, StegoError> {
        layout.validate(posts.len(), floor.len(), residue.len())?;

        let res_len = layout.res_len();
        self.state.reset_frame(res_len);
        self.state.derive_keys(layout.post_index)?;

        // The ISS projection decides which extraction path this frame
        // takes. A 0 bit falls back to the residue header to catch the
        // sender's forced frames; an indeterminate projection stays on the
        // ISS path, where the 0xFF size escape disambiguates.
        let mut frame_sync = self.state.sync_method;
        if frame_sync == SyncMethod::Iss {
            let synchro_key = self
                .state
                .synchro_key
                .clone()
                .ok_or(StegoError::Internal("frame keys not derived"))?;
            let cfg = sync::iss::IssConfig::derive(
                posts,
                self.state.sigma,
                &synchro_key,
                &mut self.state.prng,
            )?;
            if sync::iss::read_mark(posts, &cfg) == sync::iss::MarkBit::Zero {
                trace!(frame = self.state.frames, "presence bit 0, trying residue header");
                frame_sync = SyncMethod::ForcedResHeader;
            }
        }

        let hiding_seed = self.state.hiding_seed()?;
        self.state.prng.seed(&hiding_seed)?;
        self.state.calculate_lineup(res_len)?;

        let extracted = extract_subliminal(
            frame_sync,
            self.state.hide_method,
            &self.state.res_lineup,
            floor,
            residue,
            &mut self.state.prng,
        )?;
        if extracted.bits == 0 {
            return Ok(ExtractOutcome::Empty);
        }

        // Merge the carry bits from earlier frames, pass on whole bytes,
        // hold the remainder back.
        let total = self.carry_len + extracted.bits;
        let mut merged = BitBuffer::new();
        for i in 0..self.carry_len {
            merged.push_bit((self.carry >> (7 - i)) & 1);
        }
        for i in 0..extracted.bits {
            merged.push_bit(bitpack::bit_at(&extracted.bytes, i));
        }

        let whole_bytes = total / 8;
        self.carry_len = total % 8;
        let bytes = merged.into_bytes();
        self.carry = 0;
        for i in 0..self.carry_len {
            let bit = bitpack::bit_at(&bytes, whole_bytes * 8 + i);
            self.carry |= bit << (7 - i);
        }

        if whole_bytes == 0 {
            return Ok(ExtractOutcome::Data { delivered: 0 });
        }
        self.state.read += (whole_bytes * 8) as u64;
        self.ring.append(&bytes[..whole_bytes])?;
        debug!(
            frame = self.state.frames,
            bits = extracted.bits,
            carry = self.carry_len,
            "recovered subliminal bytes"
        );

        // Drain every complete packet the new bytes unlocked.
        let mut delivered = 0usize;
        let mut ended = false;
        loop {
            match inverse(&mut self.crypto, &mut self.ring, &mut self.sink) {
                Ok(progress) => {
                    delivered += progress.delivered;
                    if progress.end_of_stream {
                        ended = true;
                    }
                    if progress.consumed == 0 {
                        break;
                    }
                },
                // A damaged or misframed packet costs itself, nothing else.
                Err(CryptoError::CheckFail { discard }) => {
                    debug!(discard, "dropped packet failing integrity");
                },
                Err(CryptoError::BadMessage { discard, reason }) => {
                    debug!(discard, reason, "discarded misframed bytes");
                    if discard == 0 {
                        break;
                    }
                },
                Err(err) => return Err(err.into()),
            }
        }

        if ended && !self.end_reported {
            self.end_reported = true;
            debug!("terminal packet consumed, stream complete");
            return Ok(ExtractOutcome::EndOfStream);
        }
        Ok(ExtractOutcome::Data { delivered })
    }
}
