//! Self-invertible hiding transforms.
//!
//! Applied to the subliminal byte string before embedding and again after
//! extraction. Both transforms are involutions: applying them twice with
//! identical PRNG state restores the input, which is what lets the two
//! peers share one code path. Chunk order matters — the un-hiding side must
//! process header, size field and payload in the same order the hiding side
//! transformed them, so the PRNG draws line up.

use crate::{error::StegoError, prng::SequencePrng};

/// Pseudo-random floor bits XOR-folded into each payload bit by the parity
/// method (Anderson & Petitcolas).
pub const BITS_PARITY: usize = 2;

/// Transform applied to the subliminal bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HideMethod {
    /// Pass the bits through untouched.
    #[default]
    Identity,
    /// XOR each bit with [`BITS_PARITY`] pseudo-randomly addressed bits of
    /// the integer floor vector. Both peers must present the identical
    /// floor vector for the involution to hold.
    Parity,
}

/// Apply `method` to the first `bit_len` bits of `buf` in place.
///
/// Bit positions are LSB-indexed within each byte on both the read and the
/// write side, so the mapping is position-preserving and the transform
/// stays self-inverse.
///
/// # Errors
///
/// - `StegoError::InvalidArgument` when the parity method is asked to draw
///   from an empty floor vector or `bit_len` overruns `buf`.
pub fn apply(
    method: HideMethod,
    buf: &mut [u8],
    bit_len: usize,
    floor: &[i32],
    prng: &mut SequencePrng,
) -> Result<(), StegoError> {
    if bit_len > buf.len() * 8 {
        return Err(StegoError::InvalidArgument("hide length overruns buffer"));
    }

    match method {
        HideMethod::Identity => Ok(()),
        HideMethod::Parity => {
            if floor.is_empty() {
                return Err(StegoError::InvalidArgument("parity method needs a floor vector"));
            }
            let floor_bits = (floor.len() * 32) as u32;

            for k in 0..bit_len {
                let byte = k / 8;
                let bit = k % 8;
                let mut parity = (buf[byte] >> bit) & 1;

                for _ in 0..BITS_PARITY {
                    let rnd = prng.next(floor_bits)? as usize;
                    let read_byte = rnd / 8;
                    let elem = read_byte / 4;
                    let elem_bit = (rnd % 8) + (read_byte % 4) * 8;
                    parity ^= ((floor[elem] >> elem_bit) & 1) as u8;
                }

                buf[byte] = (buf[byte] & !(1u8 << bit)) | (parity << bit);
            }
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SequencePrng {
        let mut prng = SequencePrng::new();
        prng.seed(b"hide-key").unwrap();
        prng
    }

    #[test]
    fn identity_leaves_bits_alone() {
        let mut buf = [0xA5u8, 0x3C];
        let mut prng = seeded();
        apply(HideMethod::Identity, &mut buf, 16, &[], &mut prng).unwrap();
        assert_eq!(buf, [0xA5, 0x3C]);
        assert_eq!(prng.iters(), 0);
    }

    #[test]
    fn parity_is_self_inverse() {
        let floor: Vec<i32> = (0..64).map(|i| i * 37 - 1000).collect();
        let original = [0xDEu8, 0xAD, 0xBE, 0xEF];

        let mut buf = original;
        let mut prng = seeded();
        apply(HideMethod::Parity, &mut buf, 30, &floor, &mut prng).unwrap();

        let mut prng = seeded();
        apply(HideMethod::Parity, &mut buf, 30, &floor, &mut prng).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn parity_inverts_across_chunk_boundaries() {
        // Hiding transforms the whole message at once; un-hiding may work
        // chunk by chunk. Same PRNG order, same result.
        let floor: Vec<i32> = (0..32).map(|i| i * 7919).collect();
        let original = [0x12u8, 0x34, 0x56];

        let mut whole = original;
        let mut prng = seeded();
        apply(HideMethod::Parity, &mut whole, 24, &floor, &mut prng).unwrap();

        let mut chunked = whole;
        let mut prng = seeded();
        apply(HideMethod::Parity, &mut chunked[..1], 8, &floor, &mut prng).unwrap();
        apply(HideMethod::Parity, &mut chunked[1..], 16, &floor, &mut prng).unwrap();
        assert_eq!(chunked, original);
    }

    #[test]
    fn parity_consumes_two_draws_per_bit() {
        let floor = vec![0i32; 16];
        let mut buf = [0u8; 2];
        let mut prng = seeded();
        apply(HideMethod::Parity, &mut buf, 11, &floor, &mut prng).unwrap();
        assert_eq!(prng.iters(), 22);
    }

    #[test]
    fn parity_without_floor_is_rejected() {
        let mut buf = [0u8];
        let mut prng = seeded();
        assert!(matches!(
            apply(HideMethod::Parity, &mut buf, 8, &[], &mut prng),
            Err(StegoError::InvalidArgument(_))
        ));
    }
}
