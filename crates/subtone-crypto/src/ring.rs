//! Byte queue between the packetizer and the steganographic layer.
//!
//! The sender stages whole packets here and drains them bit by bit into
//! audio frames; the receiver accumulates recovered bytes here until a
//! whole packet can be parsed. Capacity is sized so one full packet can
//! always be staged without splitting.

use crate::error::CryptoError;

/// Bounded FIFO of raw packet bytes.
///
/// # Invariants
///
/// - `len() <= capacity()` at all times; oversized appends are rejected.
/// - The buffered bytes always form a prefix of the in-flight packet
///   sequence.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl RingBuffer {
    /// Create a buffer bounded at `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity), capacity }
    }

    /// Maximum number of buffered bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append `bytes` at the back.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidArgument` when the append would exceed the
    ///   capacity bound.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), CryptoError> {
        if self.buf.len() + bytes.len() > self.capacity {
            return Err(CryptoError::InvalidArgument("ring buffer overflow"));
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Drop the first `n` bytes (all of them when `n >= len()`).
    pub fn drain_front(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
    }

    /// View of the buffered bytes, front first.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}
