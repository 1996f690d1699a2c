//! Session configuration consumed from the embedding application.

use subtone_proto::IV_LEN;

use crate::{hide::HideMethod, sync::SyncMethod};

/// Everything a peer needs to open a channel, with the protocol defaults
/// filled in. The application layer (CLI parsing, config files) is an
/// external collaborator; this struct is the whole interface.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cipher algorithm name; `None` selects ARCFOUR.
    pub cipher_name: Option<String>,
    /// Digest algorithm name; `None` selects SHA1.
    pub digest_name: Option<String>,
    /// Use the HMAC variant of the digest.
    pub hmac: bool,
    /// Initial IV; `None` selects the built-in constant.
    pub iv: Option<[u8; IV_LEN]>,
    /// Emission id; 0 on the receive side accepts any emission.
    pub emission: u64,
    /// Starting packet id.
    pub packet: u64,
    /// Default payload bytes per crypto packet; 0 selects the wire default.
    pub default_data_len: usize,
    /// Transform applied to the subliminal bitstream.
    pub hide_method: HideMethod,
    /// Synchronization backend for the session.
    pub sync_method: SyncMethod,
    /// Desired aggressiveness: tenths of the frame capacity to use, 1..=10.
    pub aggressiveness: u32,
    /// ISS watermark strength; must be positive when ISS is selected.
    pub sigma: f32,
    /// Shared master key, at least 16 bytes.
    pub key: Vec<u8>,
    /// Sender only: frames to skip before the first embedding.
    pub delay_frames: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cipher_name: None,
            digest_name: None,
            hmac: false,
            iv: None,
            emission: 0,
            packet: 1,
            default_data_len: 0,
            hide_method: HideMethod::Identity,
            sync_method: SyncMethod::ResHeader,
            aggressiveness: 3,
            sigma: 1.0,
            key: Vec::new(),
            delay_frames: 0,
        }
    }
}
