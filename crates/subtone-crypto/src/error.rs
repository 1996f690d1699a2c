//! Error types for the cryptographic packet layer.

use std::io;

use subtone_proto::WireError;
use thiserror::Error;

/// Errors raised while producing, parsing or transporting crypto packets.
///
/// `BadMessage` and `CheckFail` are recoverable: they carry the number of
/// buffered bytes the caller should discard before continuing, so a single
/// damaged packet never takes the session down.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Null-equivalent or out-of-range parameter, or a too-small buffer.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Cipher or digest algorithm outside the whitelist.
    #[error("unsupported {kind} algorithm: {name}")]
    Unsupported {
        /// "cipher" or "digest"
        kind: &'static str,
        /// The rejected algorithm name
        name: String,
    },

    /// Wire-format violation: bad SYNC, wrong emission id, wrong packet id.
    #[error("malformed packet ({reason}), discard {discard} byte(s)")]
    BadMessage {
        /// Buffered bytes to discard before the next parse attempt
        discard: usize,
        /// Which check failed
        reason: &'static str,
    },

    /// Packet digest mismatch; the packet is dropped, the session continues.
    #[error("packet integrity check failed, discard {discard} byte(s)")]
    CheckFail {
        /// Length of the rejected packet
        discard: usize,
    },

    /// The terminal packet (id 0) has already been emitted or consumed.
    #[error("end of stream")]
    EndOfStream,

    /// Failure inside a cryptographic primitive.
    #[error("crypto backend failure: {0}")]
    Internal(&'static str),

    /// Payload source/sink I/O failure.
    #[error("payload I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<WireError> for CryptoError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::BadSync { skip } => {
                Self::BadMessage { discard: skip, reason: "bad sync field" }
            },
            WireError::BufferTooSmall { .. } => Self::InvalidArgument("buffer too small"),
            WireError::OutOfRange(what) => Self::InvalidArgument(what),
        }
    }
}
