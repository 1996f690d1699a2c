//! Per-frame subkey derivation.
//!
//! Both peers see the same floor post ordering for a frame, so its digest
//! makes a frame-unique public value; encrypting that digest under the
//! master key yields subkeys only the key holders can reproduce. The same
//! 16 bytes serve as the hiding subkey (PRNG seed for the lineup and the
//! parity mask) and the synchro subkey (ISS watermark seed).

use md5::{Digest, Md5};
use subtone_crypto::Rc4Stream;
use subtone_proto::bitpack;
use zeroize::Zeroize;

use crate::error::StegoError;

/// A derived 128-bit frame subkey, zeroed on drop.
pub struct FrameKey {
    bytes: [u8; 16],
}

impl FrameKey {
    /// Key length in bits.
    pub const BITS: usize = 128;

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.bytes
    }
}

impl Clone for FrameKey {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl Drop for FrameKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FrameKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FrameKey(128 bits)")
    }
}

/// Derive the hiding and synchro subkeys for one frame.
///
/// MD5 over the big-endian serialization of the post ordering index,
/// encrypted with the master-keyed stream cipher. Both returned keys hold
/// the same 16 bytes.
///
/// # Errors
///
/// - `StegoError::InvalidArgument` on an empty index.
/// - Propagates cipher setup failures from the crypto layer.
pub fn derive_frame_keys(
    master_key: &[u8],
    post_index: &[i32],
) -> Result<(FrameKey, FrameKey), StegoError> {
    if post_index.is_empty() {
        return Err(StegoError::InvalidArgument("empty post index"));
    }

    let serialized = bitpack::i32s_to_be_bytes(post_index);
    let mut bytes: [u8; 16] = Md5::digest(&serialized).into();
    Rc4Stream::new(master_key)?.apply_keystream(&mut bytes);

    let hiding = FrameKey { bytes };
    let synchro = hiding.clone();
    Ok((hiding, synchro))
}
