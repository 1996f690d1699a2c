//! Key material containers.
//!
//! Keys are opaque byte sequences whose length field always matches the
//! buffer. Construction copies; dropping zeroes the bytes.

use zeroize::Zeroize;

use crate::error::CryptoError;

/// A long-lived secret (master key or IV material), zeroed on drop.
pub struct SecretKey {
    bytes: Vec<u8>,
}

impl SecretKey {
    /// Copy `bytes` into a new key.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidArgument` when `bytes` is empty.
    pub fn new(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.is_empty() {
            return Err(CryptoError::InvalidArgument("empty key"));
        }
        Ok(Self { bytes: bytes.to_vec() })
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the key holds no bytes. Always false for constructed keys.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey({} bytes)", self.bytes.len())
    }
}

/// A derived 128-bit per-packet working key, zeroed on drop.
///
/// Derived from `(master_key, emission_id, packet_id)`; used as both the
/// packet cipher key and, when HMAC is enabled, the digest key, then
/// discarded.
pub struct PacketKey(pub(crate) [u8; 16]);

impl PacketKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Drop for PacketKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for PacketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PacketKey(16 bytes)")
    }
}
