//! Algorithm whitelist and name resolution.
//!
//! The protocol negotiates algorithms by name (the embedding application
//! passes them through from its configuration). Both peers must agree on
//! every primitive, so anything outside the whitelist is rejected at
//! session init, once, before any data flows.

use subtone_proto::DATA_DIGEST_RATIO;

use crate::error::CryptoError;

/// Stream ciphers accepted for packet payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgo {
    /// RC4 ("ARCFOUR"), keyed per packet, no IV consumed.
    Arcfour,
}

impl CipherAlgo {
    /// Name assumed when the configuration omits the cipher.
    pub const DEFAULT_NAME: &'static str = "ARCFOUR";

    /// Resolve a configured name, falling back to the default when absent.
    ///
    /// # Errors
    ///
    /// - `CryptoError::Unsupported` for any name outside the whitelist.
    pub fn from_name(name: Option<&str>) -> Result<Self, CryptoError> {
        let name = name.unwrap_or(Self::DEFAULT_NAME);
        if name.eq_ignore_ascii_case("ARCFOUR") {
            Ok(Self::Arcfour)
        } else {
            Err(CryptoError::Unsupported { kind: "cipher", name: name.to_owned() })
        }
    }

    /// Canonical algorithm name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Arcfour => "ARCFOUR",
        }
    }
}

/// Digest algorithms accepted for packet integrity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgo {
    /// SHA-1, plain or HMAC-keyed.
    Sha1,
}

impl DigestAlgo {
    /// Name assumed when the configuration omits the digest.
    pub const DEFAULT_NAME: &'static str = "SHA1";

    /// Resolve a configured name, falling back to the default when absent.
    ///
    /// # Errors
    ///
    /// - `CryptoError::Unsupported` for any name outside the whitelist.
    pub fn from_name(name: Option<&str>) -> Result<Self, CryptoError> {
        let name = name.unwrap_or(Self::DEFAULT_NAME);
        if name.eq_ignore_ascii_case("SHA1") || name.eq_ignore_ascii_case("SHA-1") {
            Ok(Self::Sha1)
        } else {
            Err(CryptoError::Unsupported { kind: "digest", name: name.to_owned() })
        }
    }

    /// Canonical algorithm name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
        }
    }

    /// Digest length in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
        }
    }

    /// Maximum payload bytes per packet, keeping the data/digest ratio.
    pub fn max_data(self) -> usize {
        self.digest_len() * DATA_DIGEST_RATIO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_when_name_absent() {
        assert_eq!(CipherAlgo::from_name(None).unwrap(), CipherAlgo::Arcfour);
        assert_eq!(DigestAlgo::from_name(None).unwrap(), DigestAlgo::Sha1);
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(CipherAlgo::from_name(Some("arcfour")).unwrap(), CipherAlgo::Arcfour);
        assert_eq!(DigestAlgo::from_name(Some("sha-1")).unwrap(), DigestAlgo::Sha1);
    }

    #[test]
    fn unknown_algorithms_are_rejected() {
        assert!(matches!(
            CipherAlgo::from_name(Some("AES256")),
            Err(CryptoError::Unsupported { kind: "cipher", .. })
        ));
        assert!(matches!(
            DigestAlgo::from_name(Some("MD5")),
            Err(CryptoError::Unsupported { kind: "digest", .. })
        ));
    }

    #[test]
    fn sha1_sizes() {
        assert_eq!(DigestAlgo::Sha1.digest_len(), 20);
        assert_eq!(DigestAlgo::Sha1.max_data(), 320);
    }
}
