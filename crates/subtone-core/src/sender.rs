//! Sender-side per-frame driver.
//!
//! Ties the whole stack together once per frame and channel: derive frame
//! subkeys, keep the crypto ring topped up, measure capacity, then either
//! embed the next payload bits or explicitly desynchronize so an empty
//! frame cannot look full.

use std::io::{Read, Seek};

use subtone_crypto::{CryptoConfig, CryptoSession, PayloadSource, RingBuffer, forward};
use tracing::{debug, trace};

use crate::{
    capacity::{measure_capacity, target_usage_bits},
    config::SessionConfig,
    embed::hide_data,
    error::StegoError,
    frame::FloorLayout,
    state::StegoState,
    sync::{self, MAX_SUBLIMINAL_SIZE, SyncMethod},
};

/// What happened to one frame on the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedOutcome {
    /// Still inside the initial delay window; frame untouched.
    Delayed,
    /// Payload bits were committed into the residue.
    Embedded {
        /// Pure payload bits (headers excluded).
        bits: usize,
    },
    /// Nothing to send; the frame was explicitly desynchronized.
    Desynchronized,
}

/// One sending peer: steganographic state plus its cryptographic session
/// and payload source.
pub struct SenderSession<R> {
    state: StegoState,
    crypto: CryptoSession,
    ring: RingBuffer,
    source: PayloadSource<R>,
    delay_frames: u64,
    frames_seen: u64,
}

impl<R: Read + Seek> SenderSession<R> {
    /// Open a sending session over `payload`.
    ///
    /// # Errors
    ///
    /// - `StegoError::InvalidArgument` for out-of-range configuration.
    /// - Crypto-layer errors for rejected algorithms or keys.
    pub fn new(config: &SessionConfig, payload: R) -> Result<Self, StegoError> {
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
        let source = PayloadSource::new(payload)?;

        Ok(Self {
            state,
            crypto,
            ring,
            source,
            delay_frames: config.delay_frames,
            frames_seen: 0,
        })
    }

    /// Whether every payload byte has been embedded and the terminal
    /// packet has left the ring.
    pub fn drained(&self) -> bool {
        self.crypto.is_drained() && self.ring.is_empty()
    }

    /// Pure payload bits embedded so far.
    pub fn bits_sent(&self) -> u64 {
        self.state.bits_sent()
    }

    /// Process one frame and channel.
    ///
    /// `posts` may be rewritten by the ISS watermark; `residue` receives
    /// the subliminal bits. Both stay untouched on `FrameSkip`.
    ///
    /// # Errors
    ///
    /// - `StegoError::FrameSkip` when the frame cannot safely carry data.
    /// - `StegoError::SyncFail` never escapes: an ISS refusal falls back
    ///   to the forced residue header within the same frame.
    pub fn embed_frame(
        &mut self,
        layout: &FloorLayout<'_>,
        posts: &mut [i32],
        floor: &[i32],
        residue: &mut [i32],
    ) -> Result<EmbedOutcome, StegoError> {
        layout.validate(posts.len(), floor.len(), residue.len())?;

        if self.frames_seen < self.delay_frames {
            self.frames_seen += 1;
            return Ok(EmbedOutcome::Delayed);
        }
        self.frames_seen += 1;

        let res_len = layout.res_len();
        self.state.reset_frame(res_len);
        self.state.derive_keys(layout.post_index)?;

        // Keep at least a frame's worth of packet bytes staged.
        forward(&mut self.crypto, &mut self.ring, &mut self.source, 0)?;
        let have_data = !self.ring.is_empty();

        // The ISS mark must go in before the hiding PRNG is seeded: its
        // watermark draws from the synchro subkey.
        let mut frame_sync = self.state.sync_method;
        if frame_sync == SyncMethod::Iss && have_data {
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
            match sync::iss::write_mark(layout, posts, true, &cfg) {
                Ok(()) => {},
                Err(StegoError::SyncFail) => {
                    debug!(frame = self.state.frames, "ISS refused, forcing residue header");
                    frame_sync = SyncMethod::ForcedResHeader;
                },
                Err(err) => return Err(err),
            }
        }

        let hiding_seed = self.state.hiding_seed()?;
        self.state.prng.seed(&hiding_seed)?;

        if !have_data {
            self.state.calculate_lineup(res_len)?;
            match frame_sync {
                SyncMethod::Iss => sync::iss::desynchronize(
                    self.state.hide_method,
                    floor,
                    &self.state.res_lineup,
                    residue,
                    &mut self.state.prng,
                )?,
                SyncMethod::ResHeader | SyncMethod::ForcedResHeader => {
                    sync::res_header::desynchronize(
                        self.state.hide_method,
                        floor,
                        &self.state.res_lineup,
                        residue,
                        &mut self.state.prng,
                    )?;
                },
            }
            trace!(frame = self.state.frames, "desynchronized empty frame");
            return Ok(EmbedOutcome::Desynchronized);
        }

        measure_capacity(&mut self.state, residue, layout.rate)?;
        if frame_sync.uses_res_header()
            && self.state.min_fc_capacity <= (sync::SYNCHRO_HEADER_BYTES * 8) as u64
        {
            trace!(frame = self.state.frames, "capacity below header floor, skipping");
            return Err(StegoError::FrameSkip);
        }

        self.state.calculate_lineup(res_len)?;

        let mut usage = target_usage_bits(&self.state);
        if usage == MAX_SUBLIMINAL_SIZE
            && matches!(
                self.state.sync_method,
                SyncMethod::Iss | SyncMethod::ForcedResHeader
            )
        {
            // 0xFF in the size field is the forced-header escape.
            usage -= 1;
        }

        // Stage the pending bytes, discarding bits already sent from the
        // head byte in earlier frames.
        let carry = (self.state.sent % 8) as usize;
        let take = self.ring.len().min(MAX_SUBLIMINAL_SIZE);
        let mut data = self.ring.as_slice()[..take].to_vec();
        let d_len_bits = if carry > 0 {
            for i in 0..take {
                data[i] <<= carry;
                if i + 1 < take {
                    data[i] |= data[i + 1] >> (8 - carry);
                }
            }
            take * 8 - carry
        } else {
            take * 8
        };

        let pure = hide_data(
            &mut self.state,
            frame_sync,
            &data,
            d_len_bits,
            floor,
            residue,
            usage,
        )?;

        self.state.sent += pure as u64;
        let consumed_bytes = (carry + pure) / 8;
        self.ring.drain_front(consumed_bytes);

        debug!(
            frame = self.state.frames,
            bits = pure,
            ring = self.ring.len(),
            "embedded frame payload"
        );
        Ok(EmbedOutcome::Embedded { bits: pure })
    }
}
