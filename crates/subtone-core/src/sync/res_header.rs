//! Residue-header synchronization.
//!
//! The in-band scheme: a frame that carries data opens its subliminal
//! bitstream with a magic byte. The embedder writes it as part of the
//! metadata (see the embedding path); this module owns the inverse
//! problem — making sure a frame with nothing to say does not open with
//! the magic by accident.

use tracing::trace;

use crate::{
    embed::{BitBuffer, read_residue_bits},
    error::StegoError,
    hide::{self, HideMethod},
    prng::SequencePrng,
    sync::{SYNCHRO_HEADER, SYNCHRO_HEADER_BYTES},
};

/// Break an accidental magic in a frame that carries no data.
///
/// Reads the first magic-byte's worth of natural residue bits along the
/// lineup; if they un-hide to the magic, flips the least significant bit
/// of the first contributing line. A frame too quiet to produce a full
/// magic byte cannot false-positive and is left alone.
pub fn desynchronize(
    hide_method: HideMethod,
    floor: &[i32],
    lineup: &[usize],
    residue: &mut [i32],
    prng: &mut SequencePrng,
) -> Result<(), StegoError> {
    let header_bits = SYNCHRO_HEADER_BYTES * 8;
    let mut stream = BitBuffer::new();
    let mut first_line: Option<usize> = None;

    for &pos in lineup {
        if stream.len() >= header_bits {
            break;
        }
        let before = stream.len();
        read_residue_bits(residue[pos], &mut stream);
        if stream.len() > before && first_line.is_none() {
            first_line = Some(pos);
        }
    }
    if stream.len() < header_bits {
        return Ok(());
    }

    let mut header = [stream.first_byte()];
    hide::apply(hide_method, &mut header, header_bits, floor, prng)?;
    if header != SYNCHRO_HEADER {
        return Ok(());
    }

    let Some(pos) = first_line else {
        return Err(StegoError::Internal("magic bits without a source line"));
    };
    let value = residue[pos];
    residue[pos] = if value % 2 != 0 { value - 1 } else { value + 1 };
    trace!(line = pos, "broke an accidental residue magic");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SequencePrng {
        let mut prng = SequencePrng::new();
        prng.seed(b"desync-res").unwrap();
        prng
    }

    #[test]
    fn accidental_magic_is_broken() {
        // One line carrying exactly 8 payload bits: |511| = 0b111111111
        // reads as 11111111, so the natural header equals the magic.
        let mut residue = vec![0i32; 16];
        residue[3] = 511;
        let lineup: Vec<usize> = (3..16).chain(0..3).collect();

        desynchronize(HideMethod::Identity, &[], &lineup, &mut residue, &mut seeded()).unwrap();
        assert_eq!(residue[3], 510);

        // Re-reading no longer yields the magic.
        let mut stream = BitBuffer::new();
        read_residue_bits(residue[3], &mut stream);
        assert_ne!(stream.first_byte(), 0xFF);
    }

    #[test]
    fn innocent_frames_are_left_alone() {
        let mut residue = vec![0i32; 16];
        residue[0] = 700;
        residue[1] = 650;
        let lineup: Vec<usize> = (0..16).collect();
        let before = residue.clone();

        desynchronize(HideMethod::Identity, &[], &lineup, &mut residue, &mut seeded()).unwrap();
        assert_eq!(residue, before);
    }

    #[test]
    fn quiet_frames_cannot_false_positive() {
        let mut residue = vec![0i32; 8];
        residue[2] = 3;
        let lineup: Vec<usize> = (0..8).collect();
        let before = residue.clone();

        desynchronize(HideMethod::Identity, &[], &lineup, &mut residue, &mut seeded()).unwrap();
        assert_eq!(residue, before);
    }
}
