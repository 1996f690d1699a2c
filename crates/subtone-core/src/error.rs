//! Error types for the steganographic layer.

use subtone_crypto::CryptoError;
use thiserror::Error;

/// Errors raised by the embedding and extraction drivers.
///
/// `FrameSkip` and `SyncFail` are per-frame conditions: the frame carries no
/// hidden data, the session and the audio stream continue untouched.
#[derive(Error, Debug)]
pub enum StegoError {
    /// Null-equivalent or out-of-range parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The current frame cannot safely carry data; skip it.
    #[error("frame skipped: insufficient subliminal capacity")]
    FrameSkip,

    /// The synchronization backend could not encode the intended bit.
    #[error("unable to synchronize this frame")]
    SyncFail,

    /// Failure bubbled up from the cryptographic layer.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Broken internal invariant.
    #[error("internal error: {0}")]
    Internal(&'static str),
}
