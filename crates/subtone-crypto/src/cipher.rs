//! Stream cipher and digest façade.
//!
//! Thin wrappers over the RustCrypto primitives so the rest of the crate
//! speaks in terms of the protocol's whitelisted algorithms instead of
//! generic type parameters. RC4 key sizes follow the usual 128/192/256-bit
//! tiers; derived per-packet keys are always 128-bit.

use hmac::{Hmac, Mac};
use rc4::{
    KeyInit, Rc4, StreamCipher,
    consts::{U16, U24, U32},
};
use sha1::{Digest, Sha1};

use crate::{algo::DigestAlgo, error::CryptoError};

type HmacSha1 = Hmac<Sha1>;

/// A keyed RC4 keystream.
///
/// The keystream state advances with every [`apply_keystream`] call, exactly
/// like a long-lived cipher handle; re-key by constructing a new value.
///
/// [`apply_keystream`]: Self::apply_keystream
pub enum Rc4Stream {
    /// 128-bit key.
    K16(Box<Rc4<U16>>),
    /// 192-bit key.
    K24(Box<Rc4<U24>>),
    /// 256-bit key.
    K32(Box<Rc4<U32>>),
}

impl Rc4Stream {
    /// Key a fresh keystream. Accepts 16-, 24- or 32-byte keys.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidArgument` for any other key length.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        match key.len() {
            16 => Rc4::new_from_slice(key)
                .map(|c| Self::K16(Box::new(c)))
                .map_err(|_| CryptoError::Internal("RC4 key setup")),
            24 => Rc4::new_from_slice(key)
                .map(|c| Self::K24(Box::new(c)))
                .map_err(|_| CryptoError::Internal("RC4 key setup")),
            32 => Rc4::new_from_slice(key)
                .map(|c| Self::K32(Box::new(c)))
                .map_err(|_| CryptoError::Internal("RC4 key setup")),
            _ => Err(CryptoError::InvalidArgument("RC4 key must be 16, 24 or 32 bytes")),
        }
    }

    /// XOR the next keystream bytes into `buf` (encrypts and decrypts).
    pub fn apply_keystream(&mut self, buf: &mut [u8]) {
        match self {
            Self::K16(c) => c.apply_keystream(buf),
            Self::K24(c) => c.apply_keystream(buf),
            Self::K32(c) => c.apply_keystream(buf),
        }
    }
}

/// Digest `data`, keyed when `hmac_key` is given.
///
/// Each call is a fresh computation; the façade keeps no digest state
/// between packets.
pub fn packet_digest(
    algo: DigestAlgo,
    hmac_key: Option<&[u8]>,
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    match algo {
        DigestAlgo::Sha1 => match hmac_key {
            Some(key) => {
                let Ok(mut mac) = <HmacSha1 as Mac>::new_from_slice(key) else {
                    unreachable!("HMAC-SHA1 accepts any key size");
                };
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            },
            None => Ok(Sha1::digest(data).to_vec()),
        },
    }
}
