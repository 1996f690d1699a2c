//! Big-endian field stores and bit-level buffer manipulation.
//!
//! Every multi-byte integer on the wire is big-endian; every bit stream is
//! consumed most-significant-bit first. The embedder and extractor on the
//! two peers must agree on these conventions exactly, so they are defined
//! once here and reused everywhere.

use crate::error::WireError;

/// Write a `u32` big-endian at `offset`.
pub fn write_u32_be(buf: &mut [u8], offset: usize, value: u32) -> Result<(), WireError> {
    let end = offset.checked_add(4).ok_or(WireError::OutOfRange("u32 field offset"))?;
    let Some(slot) = buf.get_mut(offset..end) else {
        return Err(WireError::BufferTooSmall { needed: end, actual: buf.len() });
    };
    slot.copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Write a `u64` big-endian at `offset`.
pub fn write_u64_be(buf: &mut [u8], offset: usize, value: u64) -> Result<(), WireError> {
    let end = offset.checked_add(8).ok_or(WireError::OutOfRange("u64 field offset"))?;
    let Some(slot) = buf.get_mut(offset..end) else {
        return Err(WireError::BufferTooSmall { needed: end, actual: buf.len() });
    };
    slot.copy_from_slice(&value.to_be_bytes());
    Ok(())
}

/// Read a big-endian `u32` at `offset`.
pub fn read_u32_be(buf: &[u8], offset: usize) -> Result<u32, WireError> {
    let end = offset.checked_add(4).ok_or(WireError::OutOfRange("u32 field offset"))?;
    let Some(slot) = buf.get(offset..end) else {
        return Err(WireError::BufferTooSmall { needed: end, actual: buf.len() });
    };
    let mut raw = [0u8; 4];
    raw.copy_from_slice(slot);
    Ok(u32::from_be_bytes(raw))
}

/// Read a big-endian `u64` at `offset`.
pub fn read_u64_be(buf: &[u8], offset: usize) -> Result<u64, WireError> {
    let end = offset.checked_add(8).ok_or(WireError::OutOfRange("u64 field offset"))?;
    let Some(slot) = buf.get(offset..end) else {
        return Err(WireError::BufferTooSmall { needed: end, actual: buf.len() });
    };
    let mut raw = [0u8; 8];
    raw.copy_from_slice(slot);
    Ok(u64::from_be_bytes(raw))
}

/// Serialize a slice of `i32` values as contiguous big-endian bytes.
///
/// Used to feed integer vectors (e.g. the floor post ordering) into digests
/// so both peers hash identical bytes regardless of host endianness.
pub fn i32s_to_be_bytes(values: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

/// Read the bit at `index`, most-significant-bit first within each byte.
///
/// Returns 0 or 1. Callers must keep `index` in bounds; out-of-range reads
/// yield 0 so cursor loops can be written without a bounds branch.
#[must_use]
pub fn bit_at(buf: &[u8], index: usize) -> u8 {
    let Some(byte) = buf.get(index / 8) else {
        return 0;
    };
    (byte >> (7 - (index % 8))) & 1
}

/// Set the bit at `index` (MSB-first within each byte) to `bit & 1`.
pub fn set_bit(buf: &mut [u8], index: usize, bit: u8) {
    if let Some(byte) = buf.get_mut(index / 8) {
        let mask = 1u8 << (7 - (index % 8));
        if bit & 1 == 1 {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
}

/// Rotate the first `bit_len` bits of `buf` left by `rot` bits.
///
/// A true rotation: bits shifted past the front re-enter at the back, so
/// `bitstream_ror(bitstream_rol(s, k), k) == s` for every `k`. Bits beyond
/// `bit_len` are left untouched.
pub fn bitstream_rol(buf: &mut [u8], bit_len: usize, rot: usize) -> Result<(), WireError> {
    rotate(buf, bit_len, rot, Direction::Left)
}

/// Rotate the first `bit_len` bits of `buf` right by `rot` bits.
///
/// Inverse of [`bitstream_rol`] for the same `bit_len` and `rot`.
pub fn bitstream_ror(buf: &mut [u8], bit_len: usize, rot: usize) -> Result<(), WireError> {
    rotate(buf, bit_len, rot, Direction::Right)
}

enum Direction {
    Left,
    Right,
}

fn rotate(buf: &mut [u8], bit_len: usize, rot: usize, dir: Direction) -> Result<(), WireError> {
    if bit_len > buf.len() * 8 {
        return Err(WireError::OutOfRange("rotation length exceeds buffer"));
    }
    if bit_len == 0 {
        return Ok(());
    }
    let rot = rot % bit_len;
    if rot == 0 {
        return Ok(());
    }

    let mut bits = Vec::with_capacity(bit_len);
    for i in 0..bit_len {
        bits.push(bit_at(buf, i));
    }

    for i in 0..bit_len {
        let src = match dir {
            Direction::Left => (i + rot) % bit_len,
            Direction::Right => (i + bit_len - rot) % bit_len,
        };
        set_bit(buf, i, bits[src]);
    }
    Ok(())
}
