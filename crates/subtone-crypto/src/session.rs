//! Per-session packet producer and parser.
//!
//! A [`CryptoSession`] owns the algorithm choice, the master key, the
//! running emission/packet counters and the current IV. It turns plaintext
//! chunks into authenticated wire packets and back, deriving a fresh
//! 128-bit working key for every packet from `(master, emission, packet)`
//! so keystreams never repeat and replayed packets are detectable.

use std::sync::Once;

use subtone_proto::{
    DEFAULT_DATA_LEN, DEFAULT_IV, HEADER_LEN, IV_LEN, MIN_DIGEST_LEN, PacketHeader, SYNC_LEN,
    WireError,
};
use tracing::{debug, warn};

use crate::{
    algo::{CipherAlgo, DigestAlgo},
    cipher::{Rc4Stream, packet_digest},
    error::CryptoError,
    key::{PacketKey, SecretKey},
};

static UNSUPPORTED_WARNING: Once = Once::new();

/// Session parameters handed in by the embedding application.
///
/// `None` names select the protocol defaults (ARCFOUR / SHA1); a `None` IV
/// selects the built-in constant; a `default_data_len` of 0 selects the
/// wire-format default payload size.
#[derive(Debug, Clone, Copy)]
pub struct CryptoConfig<'a> {
    /// Cipher algorithm name, e.g. `"ARCFOUR"`.
    pub cipher_name: Option<&'a str>,
    /// Digest algorithm name, e.g. `"SHA1"`.
    pub digest_name: Option<&'a str>,
    /// Use the HMAC variant of the digest, keyed per packet.
    pub hmac: bool,
    /// Master key; at least 16 bytes, RC4 tier sizes (16/24/32).
    pub key: &'a [u8],
    /// Initial IV; the receiver overwrites it from each packet header.
    pub iv: Option<[u8; IV_LEN]>,
    /// Emission id bound into every packet key. 0 on the receive side
    /// accepts any emission.
    pub emission: u64,
    /// First packet id (1 for a fresh stream; 0 would be terminal).
    pub packet: u64,
    /// Default payload bytes per packet; 0 selects the wire default.
    pub default_data_len: usize,
}

impl Default for CryptoConfig<'_> {
    fn default() -> Self {
        Self {
            cipher_name: None,
            digest_name: None,
            hmac: false,
            key: &[],
            iv: None,
            emission: 0,
            packet: 1,
            default_data_len: 0,
        }
    }
}

/// Result of producing one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducedPacket {
    /// Plaintext bytes packed into this packet (may be less than offered).
    pub data_written: usize,
    /// Total packet length on the wire.
    pub packet_len: usize,
}

/// Result of one parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedPacket {
    /// Bytes consumed from the input buffer; 0 means "need more bytes".
    pub consumed: usize,
    /// Plaintext bytes recovered.
    pub data_len: usize,
    /// The terminal packet (id 0) was just consumed.
    pub end_of_stream: bool,
}

impl ParsedPacket {
    fn incomplete() -> Self {
        Self { consumed: 0, data_len: 0, end_of_stream: false }
    }
}

/// Cryptographic layer state for one emission.
#[derive(Debug)]
pub struct CryptoSession {
    cipher: CipherAlgo,
    digest: DigestAlgo,
    hmac: bool,
    max_data: usize,
    default_data_len: usize,
    emission: u64,
    packet: u64,
    terminal_emitted: bool,
    master_key: SecretKey,
    iv: [u8; IV_LEN],
}

impl CryptoSession {
    /// Validate the configuration and open a session.
    ///
    /// # Errors
    ///
    /// - `CryptoError::Unsupported` for algorithms outside the whitelist
    ///   (reported to the log exactly once per process).
    /// - `CryptoError::InvalidArgument` for keys shorter than 16 bytes or
    ///   outside the RC4 size tiers.
    pub fn new(config: &CryptoConfig<'_>) -> Result<Self, CryptoError> {
        let cipher = CipherAlgo::from_name(config.cipher_name).inspect_err(|err| {
            UNSUPPORTED_WARNING
                .call_once(|| warn!(%err, "algorithm rejected, no data will be hidden"));
        })?;
        let digest = DigestAlgo::from_name(config.digest_name).inspect_err(|err| {
            UNSUPPORTED_WARNING
                .call_once(|| warn!(%err, "algorithm rejected, no data will be hidden"));
        })?;

        if config.key.len() < 16 {
            return Err(CryptoError::InvalidArgument("master key must be at least 16 bytes"));
        }
        // Fail early on key sizes the keystream cannot be built from.
        drop(Rc4Stream::new(config.key)?);

        let max_data = digest.max_data();
        let mut default_data_len = if config.default_data_len == 0 {
            DEFAULT_DATA_LEN
        } else {
            config.default_data_len
        };
        if default_data_len > max_data {
            default_data_len = max_data;
        }

        Ok(Self {
            cipher,
            digest,
            hmac: config.hmac,
            max_data,
            default_data_len,
            emission: config.emission,
            packet: config.packet,
            terminal_emitted: false,
            master_key: SecretKey::new(config.key)?,
            iv: config.iv.unwrap_or(DEFAULT_IV),
        })
    }

    /// Digest length for the session's algorithm, in bytes.
    pub fn digest_len(&self) -> usize {
        self.digest.digest_len()
    }

    /// Largest possible packet for this session, in bytes.
    pub fn max_packet_len(&self) -> usize {
        HEADER_LEN + self.max_data + self.digest_len()
    }

    /// Default payload bytes per packet after the digest-ratio cap.
    pub fn default_data_len(&self) -> usize {
        self.default_data_len
    }

    /// Next packet id; 0 once the stream has turned terminal.
    pub fn packet_id(&self) -> u64 {
        self.packet
    }

    /// Cipher chosen at init.
    pub fn cipher(&self) -> CipherAlgo {
        self.cipher
    }

    /// Flag the next produced packet as the last of the stream.
    pub fn mark_final(&mut self) {
        self.packet = 0;
    }

    /// Whether the terminal packet has been produced or consumed.
    pub fn is_drained(&self) -> bool {
        self.terminal_emitted
    }

    /// Derive the 128-bit working key for the current `(emission, packet)`.
    ///
    /// The master-keyed stream cipher encrypts the big-endian
    /// `emission ‖ packet` block; the ciphertext is the packet key (and the
    /// HMAC key when the keyed digest is enabled).
    fn derive_packet_key(&self) -> Result<PacketKey, CryptoError> {
        let mut block = [0u8; 16];
        block[..8].copy_from_slice(&self.emission.to_be_bytes());
        block[8..].copy_from_slice(&self.packet.to_be_bytes());

        // RC4 takes no IV; self.iv still travels in the header for ciphers
        // that would consume it.
        let mut stream = Rc4Stream::new(self.master_key.as_bytes())?;
        stream.apply_keystream(&mut block);
        Ok(PacketKey(block))
    }

    fn hmac_key<'k>(&self, key: &'k PacketKey) -> Option<&'k [u8]> {
        self.hmac.then(|| key.as_bytes().as_slice())
    }

    /// Assemble one authenticated packet into `out`.
    ///
    /// The payload is capped at `min(data.len(), max_data, default size)`;
    /// the remainder stays with the caller for the next packet. On success
    /// the packet id advances, except past the terminal sentinel: a packet
    /// id of 0 stays 0 and the session is drained afterwards.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidArgument` on empty input or a too-small `out`.
    /// - `CryptoError::EndOfStream` when the terminal packet already went
    ///   out.
    /// - `CryptoError::Internal` on primitive failure.
    pub fn produce_packet(
        &mut self,
        data: &[u8],
        out: &mut [u8],
    ) -> Result<ProducedPacket, CryptoError> {
        if data.is_empty() {
            return Err(CryptoError::InvalidArgument("no payload to pack"));
        }
        if self.terminal_emitted {
            return Err(CryptoError::EndOfStream);
        }

        let write = data.len().min(self.max_data).min(self.default_data_len);
        let packet_len = HEADER_LEN + write + self.digest_len();
        if out.len() < packet_len {
            return Err(CryptoError::InvalidArgument("packet buffer too small"));
        }

        let header = PacketHeader {
            data_len: write as u32,
            iv: self.iv,
            emission: self.emission,
            packet: self.packet,
        };
        header.write_to(out)?;

        let key = self.derive_packet_key()?;
        let body = &mut out[HEADER_LEN..HEADER_LEN + write];
        body.copy_from_slice(&data[..write]);
        Rc4Stream::new(key.as_bytes())?.apply_keystream(body);

        // The digest covers everything after SYNC: if the magic is damaged
        // the packet is never read, so it carries no integrity value.
        let digest =
            packet_digest(self.digest, self.hmac_key(&key), &out[SYNC_LEN..HEADER_LEN + write])?;
        out[HEADER_LEN + write..packet_len].copy_from_slice(&digest);

        debug!(packet = self.packet, bytes = write, "produced packet");

        if self.packet == 0 {
            self.terminal_emitted = true;
        } else {
            self.packet += 1;
        }

        Ok(ProducedPacket { data_written: write, packet_len })
    }

    /// Parse the first packet out of `buf`, appending plaintext to `out`.
    ///
    /// Returns `consumed == 0` (Ok) when `buf` does not yet hold a complete
    /// packet. Installs the packet's IV on the session before key
    /// derivation, verifies ids against the expected counters, checks the
    /// digest over `[SYNC_LEN, header + data)`, then decrypts.
    ///
    /// # Errors
    ///
    /// - `CryptoError::BadMessage` on a SYNC, emission-id or packet-id
    ///   violation; `discard` says how many buffered bytes to drop.
    /// - `CryptoError::CheckFail` on digest mismatch; the packet id has
    ///   already advanced, so exactly one packet is lost.
    pub fn parse_packet(
        &mut self,
        buf: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<ParsedPacket, CryptoError> {
        if buf.len() <= HEADER_LEN + MIN_DIGEST_LEN {
            return Ok(ParsedPacket::incomplete());
        }

        let header = match PacketHeader::parse(buf) {
            Ok(header) => header,
            Err(WireError::BufferTooSmall { .. }) => return Ok(ParsedPacket::incomplete()),
            Err(err) => return Err(err.into()),
        };

        let data_len = header.data_len as usize;
        let packet_len = HEADER_LEN + data_len + self.digest_len();
        if buf.len() < packet_len {
            return Ok(ParsedPacket::incomplete());
        }

        self.iv = header.iv;

        if self.emission != 0 && header.emission != self.emission {
            debug!(
                expected = self.emission,
                received = header.emission,
                "wrong emission id"
            );
            return Err(CryptoError::BadMessage { discard: 0, reason: "wrong emission id" });
        }

        if header.packet != 0 && header.packet != self.packet {
            debug!(expected = self.packet, received = header.packet, "wrong packet id");
            return Err(CryptoError::BadMessage { discard: 0, reason: "wrong packet id" });
        }

        let end_of_stream = header.packet == 0;
        if end_of_stream {
            self.packet = 0;
        }

        let key = self.derive_packet_key()?;
        let expected = &buf[HEADER_LEN + data_len..packet_len];
        let computed =
            packet_digest(self.digest, self.hmac_key(&key), &buf[SYNC_LEN..HEADER_LEN + data_len])?;

        // One packet is lost either way; keep the expected id moving so the
        // next packet still matches.
        if self.packet != 0 {
            self.packet += 1;
        } else {
            self.terminal_emitted = true;
        }

        if computed != expected {
            debug!(packet = header.packet, "integrity check failed");
            return Err(CryptoError::CheckFail { discard: packet_len });
        }

        let start = out.len();
        out.extend_from_slice(&buf[HEADER_LEN..HEADER_LEN + data_len]);
        Rc4Stream::new(key.as_bytes())?.apply_keystream(&mut out[start..]);

        debug!(packet = header.packet, bytes = data_len, "parsed packet");

        Ok(ParsedPacket { consumed: packet_len, data_len, end_of_stream })
    }
}
