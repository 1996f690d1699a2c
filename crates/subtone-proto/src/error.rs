//! Error type for structural wire-format handling.

use thiserror::Error;

/// Errors raised by bit-packing helpers and the structural header codec.
///
/// `BadSync` carries the number of bytes the caller should discard before
/// retrying, so a receiver that lost framing can slide forward through the
/// byte stream one candidate position at a time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Destination or source buffer cannot hold the requested field.
    #[error("buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall {
        /// Bytes required by the operation
        needed: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// A bit index or length argument falls outside the buffer.
    #[error("bit range out of bounds: {0}")]
    OutOfRange(&'static str),

    /// The SYNC field does not match the packet magic.
    #[error("bad sync field, discard {skip} byte(s)")]
    BadSync {
        /// Bytes to discard before the next parse attempt
        skip: usize,
    },
}
