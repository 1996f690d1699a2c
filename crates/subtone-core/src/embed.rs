//! Residue embedding and extraction.
//!
//! The subliminal bitstream travels MSB-first through the residue lines in
//! lineup order. Each line carries the low bits of its (rewritten) integer
//! value: the sender stores `(1 << j) | bits` so the leading 1 pins the bit
//! count, and the receiver recovers `j` as the position of the most
//! significant set bit. Payload order and carry accounting therefore match
//! on both sides without any side channel.

use subtone_proto::bitpack;
use tracing::trace;

use crate::{
    error::StegoError,
    hide::{self, HideMethod},
    prng::SequencePrng,
    state::StegoState,
    sync::{FORCED_SIZE_ESCAPE, SIZE_FIELD_BITS, SYNCHRO_HEADER, SYNCHRO_HEADER_BYTES, SyncMethod},
};

/// Growable MSB-first bit accumulator.
#[derive(Debug, Default)]
pub(crate) struct BitBuffer {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.bits
    }

    pub(crate) fn push_bit(&mut self, bit: u8) {
        if self.bits % 8 == 0 {
            self.bytes.push(0);
        }
        bitpack::set_bit(&mut self.bytes, self.bits, bit);
        self.bits += 1;
    }

    /// Drop the first byte; later bits keep their in-byte alignment.
    /// Headers are byte-multiples, so this is the only shift ever needed.
    pub(crate) fn drop_front_byte(&mut self) {
        if !self.bytes.is_empty() {
            self.bytes.remove(0);
            self.bits = self.bits.saturating_sub(8);
        }
    }

    pub(crate) fn first_byte(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Append the subliminal bits of one residue value, MSB-first.
///
/// A magnitude of 0 or 1 carries nothing; otherwise every bit below the
/// most significant set bit is payload.
pub(crate) fn read_residue_bits(value: i32, sink: &mut BitBuffer) -> usize {
    let magnitude = value.unsigned_abs();
    if magnitude <= 1 {
        return 0;
    }
    let msb = 31 - magnitude.leading_zeros();
    for i in (0..msb).rev() {
        sink.push_bit(((magnitude >> i) & 1) as u8);
    }
    msb as usize
}

/// Assembled subliminal frame content: `[magic?] ‖ size ‖ payload`, hidden.
pub(crate) struct Metadata {
    pub bytes: Vec<u8>,
    pub bits: usize,
}

/// Build the frame's subliminal byte string from the pending payload.
///
/// `usage_bits` is the budget the controller granted; the headers come off
/// the top and the payload fills what remains (bounded by `d_len_bits`).
/// The hide method runs over the whole string at the end.
///
/// # Errors
///
/// - `StegoError::FrameSkip` when the budget cannot even cover the
///   headers.
pub(crate) fn assemble_metadata(
    frame_sync: SyncMethod,
    hide_method: HideMethod,
    data: &[u8],
    d_len_bits: usize,
    floor: &[i32],
    usage_bits: usize,
    prng: &mut SequencePrng,
) -> Result<Metadata, StegoError> {
    if d_len_bits > data.len() * 8 {
        return Err(StegoError::InvalidArgument("bit length overruns data"));
    }
    let header_bits = frame_sync.header_bits();
    if usage_bits <= header_bits {
        return Err(StegoError::FrameSkip);
    }

    let free_bits = usage_bits - header_bits;
    let data_bits = d_len_bits.min(free_bits);
    let meta_bits = header_bits + data_bits;
    let meta_bytes = meta_bits.div_ceil(8);
    let header_bytes = header_bits / 8;

    let mut meta = vec![0u8; meta_bytes];
    let mut cursor = 0;
    if frame_sync.uses_res_header() {
        meta[..SYNCHRO_HEADER_BYTES].copy_from_slice(&SYNCHRO_HEADER);
        cursor += SYNCHRO_HEADER_BYTES;
    }
    meta[cursor] = data_bits as u8;

    let data_bytes = data_bits.div_ceil(8);
    meta[header_bytes..header_bytes + data_bytes].copy_from_slice(&data[..data_bytes]);
    // Zero any trailing bits past the payload in the last byte.
    if data_bits % 8 != 0 {
        let keep = 0xFFu8 << (8 - data_bits % 8);
        meta[header_bytes + data_bytes - 1] &= keep;
    }

    hide::apply(hide_method, &mut meta, meta_bits, floor, prng)?;

    Ok(Metadata { bytes: meta, bits: meta_bits })
}

/// Write up to `d_len` bits of `data` into `residue` along the lineup.
///
/// Per coefficient the tolerance range decides how many bits fit; when no
/// candidate lands inside the range the nearest candidate is written
/// anyway (bounded distortion overrun, payload bits stay intact). Returns
/// the bits actually consumed from `data`.
pub(crate) fn write_subliminal(
    lineup: &[usize],
    max_capacity: &[u32],
    min_capacity: &[u32],
    variation_limit: &[[f32; 2]],
    data: &[u8],
    d_len: usize,
    residue: &mut [i32],
) -> Result<usize, StegoError> {
    if d_len > data.len() * 8 {
        return Err(StegoError::InvalidArgument("bit length overruns data"));
    }

    let mut written = 0usize;
    for &pos in lineup {
        let original = residue[pos];
        let negative = original < 0;
        let limit = variation_limit[pos];
        let value_f = f64::from(original);

        // Range endpoints ordered by magnitude: `upper` is the far end.
        let (lower, upper): (i64, i64) = if (original < 0 && limit[0] < 0.0)
            || (original > 0 && limit[0] > 0.0)
        {
            (
                (value_f + f64::from(limit[1])).floor() as i64,
                (value_f + f64::from(limit[0])).ceil() as i64,
            )
        } else {
            (
                (value_f + f64::from(limit[0])).ceil() as i64,
                (value_f + f64::from(limit[1])).floor() as i64,
            )
        };

        // One candidate value must stay inside i32 after the leading 1.
        let mut max_bits = (max_capacity[pos] as usize).min(30);
        let mut min_bits = (min_capacity[pos] as usize).min(30);
        let remaining = d_len - written;
        if max_bits > remaining {
            max_bits = remaining;
            if max_bits < min_bits {
                min_bits = max_bits;
            }
        }
        if max_bits == 0 {
            continue;
        }

        // The candidate with j payload bits is the next j bits of data
        // under a fixed leading 1; dropping the last-read bit steps down.
        let mut prefix: i64 = 0;
        for j in 0..max_bits {
            prefix = (prefix << 1) | i64::from(bitpack::bit_at(data, written + j));
        }

        let floor_j = min_bits.max(1);
        let mut nearest: Option<(i64, i64)> = None;
        let mut fitted = false;
        let mut j = max_bits;
        loop {
            let candidate = prefix + (1i64 << j);
            if candidate >= lower.abs() && candidate <= upper.abs() {
                residue[pos] = if negative { -(candidate as i32) } else { candidate as i32 };
                written += j;
                fitted = true;
                break;
            }
            let distance = (candidate - lower).abs().min((candidate - upper).abs());
            if nearest.is_none_or(|(_, best)| distance < best) {
                nearest = Some((candidate, distance));
            }
            if j == floor_j {
                break;
            }
            prefix >>= 1;
            j -= 1;
        }

        // Nothing fits the masked range: commit the least-damaging
        // candidate. Its bit count still matches what the extractor will
        // read, so only distortion suffers, never data.
        if !fitted {
            let Some((candidate, _)) = nearest else {
                return Err(StegoError::Internal("no embed candidate examined"));
            };
            residue[pos] = if negative { -(candidate as i32) } else { candidate as i32 };
            let mut bits = 0usize;
            let mut m = candidate.abs();
            while m > 1 {
                bits += 1;
                m >>= 1;
            }
            written += bits;
        }

        if written >= d_len {
            break;
        }
    }

    trace!(written, requested = d_len, "embedded subliminal bits");
    Ok(written)
}

/// Extracted frame content before crypto-layer framing.
pub(crate) struct Extracted {
    /// Recovered payload bits, packed MSB-first.
    pub bytes: Vec<u8>,
    /// Number of payload bits (the frame's size field).
    pub bits: usize,
}

/// Read one frame's subliminal content back out of the residue lines.
///
/// Mirrors the embedder: walk the lineup, peel the magic (residue-header
/// modes), the size field (with the 0xFF forced-header escape), then the
/// payload, un-hiding each piece in the same order the sender hid them.
/// Returns zero bits for frames that do not carry data.
pub(crate) fn extract_subliminal(
    frame_sync: SyncMethod,
    hide_method: HideMethod,
    lineup: &[usize],
    floor: &[i32],
    residue: &[i32],
    prng: &mut SequencePrng,
) -> Result<Extracted, StegoError> {
    let res_len = residue.len();
    let empty = Extracted { bytes: Vec::new(), bits: 0 };

    let mut stream = BitBuffer::new();
    let mut next_line = 0usize;

    let fill_to = |stream: &mut BitBuffer, next_line: &mut usize, want: usize| -> bool {
        while stream.len() < want {
            if *next_line == res_len {
                return false;
            }
            read_residue_bits(residue[lineup[*next_line]], stream);
            *next_line += 1;
        }
        true
    };

    if frame_sync.uses_res_header() {
        if !fill_to(&mut stream, &mut next_line, SYNCHRO_HEADER_BYTES * 8) {
            return Ok(empty);
        }
        let mut magic = [stream.first_byte()];
        hide::apply(hide_method, &mut magic, SYNCHRO_HEADER_BYTES * 8, floor, prng)?;
        if magic != SYNCHRO_HEADER {
            trace!("no residue magic, frame carries nothing");
            return Ok(empty);
        }
        stream.drop_front_byte();
    }

    let mut size;
    loop {
        if !fill_to(&mut stream, &mut next_line, SIZE_FIELD_BITS) {
            return Ok(empty);
        }
        let mut field = [stream.first_byte()];
        hide::apply(hide_method, &mut field, SIZE_FIELD_BITS, floor, prng)?;
        size = field[0] as usize;
        stream.drop_front_byte();

        // 0xFF is reserved for the forced-residue-header escape: the byte
        // just read was the magic and the true size follows.
        if size != FORCED_SIZE_ESCAPE as usize {
            break;
        }
    }

    if size == 0 {
        return Ok(empty);
    }

    // Read payload bits; a truncated frame yields zero-padding, which the
    // crypto layer will reject on its own.
    while stream.len() < size && next_line < res_len {
        read_residue_bits(residue[lineup[next_line]], &mut stream);
        next_line += 1;
    }
    while stream.len() < size {
        stream.push_bit(0);
    }

    hide::apply(hide_method, stream.bytes_mut(), size, floor, prng)?;

    let mut bytes = stream.into_bytes();
    bytes.truncate(size.div_ceil(8));
    Ok(Extracted { bytes, bits: size })
}

/// Embed one frame's worth of payload, with capacity-shortfall retries.
///
/// Works on a scratch copy of the residue and commits only a complete
/// frame (headers fully written). When the embedder falls short of the
/// announced size, the PRNG rewinds to the post-lineup point and the whole
/// assembly repeats with the smaller budget, so the size field always
/// matches the bits on the wire. Returns the pure payload bits committed.
pub(crate) fn hide_data(
    state: &mut StegoState,
    frame_sync: SyncMethod,
    data: &[u8],
    d_len_bits: usize,
    floor: &[i32],
    residue: &mut [i32],
    usage_bits: usize,
) -> Result<usize, StegoError> {
    let hiding_seed = state.hiding_seed()?;
    let checkpoint = state.prng.iters();

    let mut write = usage_bits;
    let mut scratch;
    let mut written;
    loop {
        scratch = residue.to_vec();
        let meta = assemble_metadata(
            frame_sync,
            state.hide_method,
            data,
            d_len_bits,
            floor,
            write,
            &mut state.prng,
        )?;
        write = meta.bits;
        written = write_subliminal(
            &state.res_lineup,
            &state.res_max_capacity,
            &state.res_min_capacity,
            &state.variation_limit,
            &meta.bytes,
            write,
            &mut scratch,
        )?;
        if written > write {
            return Err(StegoError::Internal("embedder overran its budget"));
        }
        if written == write {
            break;
        }
        trace!(planned = write, written, "capacity shortfall, retrying");
        state.prng.rewind(&hiding_seed, checkpoint)?;
        write = written;
    }

    let header_bits = frame_sync.header_bits();
    let mut pure = 0usize;
    if written >= header_bits {
        state.metadata_sent += written as u64;
        pure = written - header_bits;
        residue.copy_from_slice(&scratch);
    }

    crate::capacity::update_aggressiveness(state);
    Ok(pure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SessionConfig, capacity::measure_capacity};

    fn roomy_state(res_len: usize) -> StegoState {
        let mut state = StegoState::new(&SessionConfig {
            key: vec![0x21u8; 16],
            ..SessionConfig::default()
        })
        .unwrap();
        state.reset_frame(res_len);
        state
    }

    /// Residues loud enough that every line can carry several bits.
    fn loud_residue(res_len: usize) -> Vec<i32> {
        (0..res_len)
            .map(|i| {
                let jitter = (i % 64) as i32;
                if i % 2 == 0 { 900 + jitter } else { -(700 + jitter) }
            })
            .collect()
    }

    #[test]
    fn read_residue_bits_matches_msb_rule() {
        let mut sink = BitBuffer::new();
        assert_eq!(read_residue_bits(0, &mut sink), 0);
        assert_eq!(read_residue_bits(1, &mut sink), 0);
        assert_eq!(read_residue_bits(-1, &mut sink), 0);

        // |13| = 0b1101: msb at 3, payload bits 101.
        assert_eq!(read_residue_bits(13, &mut sink), 3);
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.first_byte() >> 5, 0b101);

        // Sign is ignored.
        let mut negative = BitBuffer::new();
        assert_eq!(read_residue_bits(-13, &mut negative), 3);
        assert_eq!(negative.first_byte(), sink.first_byte());
    }

    #[test]
    fn write_then_extract_round_trips() {
        let res_len = 256;
        let mut state = roomy_state(res_len);
        let mut residue = loud_residue(res_len);
        measure_capacity(&mut state, &residue, 44_100).unwrap();
        state.prng.seed(b"embed-seed").unwrap();
        state.calculate_lineup(res_len).unwrap();

        let payload = [0xC3u8, 0x5A, 0x0F, 0xF0, 0x81];
        let d_len = payload.len() * 8;
        let written = write_subliminal(
            &state.res_lineup,
            &state.res_max_capacity,
            &state.res_min_capacity,
            &state.variation_limit,
            &payload,
            d_len,
            &mut residue,
        )
        .unwrap();
        assert_eq!(written, d_len);

        let mut stream = BitBuffer::new();
        let mut collected = 0usize;
        for &pos in &state.res_lineup {
            collected += read_residue_bits(residue[pos], &mut stream);
            if collected >= d_len {
                break;
            }
        }
        let bytes = stream.into_bytes();
        assert_eq!(&bytes[..payload.len()], &payload);
    }

    #[test]
    fn signs_survive_embedding() {
        let res_len = 64;
        let mut state = roomy_state(res_len);
        let mut residue = loud_residue(res_len);
        let signs: Vec<bool> = residue.iter().map(|r| *r < 0).collect();
        measure_capacity(&mut state, &residue, 44_100).unwrap();
        state.prng.seed(b"sign-seed").unwrap();
        state.calculate_lineup(res_len).unwrap();

        write_subliminal(
            &state.res_lineup,
            &state.res_max_capacity,
            &state.res_min_capacity,
            &state.variation_limit,
            &[0xAA; 8],
            64,
            &mut residue,
        )
        .unwrap();

        for (value, was_negative) in residue.iter().zip(signs) {
            if *value != 0 {
                assert_eq!(*value < 0, was_negative);
            }
        }
    }

    #[test]
    fn metadata_layout_res_header() {
        let mut prng = SequencePrng::new();
        prng.seed(b"meta").unwrap();
        let data = [0b1011_0011u8, 0b1100_0000];
        let meta = assemble_metadata(
            SyncMethod::ResHeader,
            HideMethod::Identity,
            &data,
            10,
            &[],
            100,
            &mut prng,
        )
        .unwrap();

        assert_eq!(meta.bits, 16 + 10);
        assert_eq!(meta.bytes[0], 0xFF);
        assert_eq!(meta.bytes[1], 10);
        assert_eq!(meta.bytes[2], 0b1011_0011);
        // Two payload bits, the rest of the byte zeroed.
        assert_eq!(meta.bytes[3], 0b1100_0000);
    }

    #[test]
    fn metadata_caps_payload_at_the_budget() {
        let mut prng = SequencePrng::new();
        prng.seed(b"meta").unwrap();
        let data = [0xFFu8; 32];
        let meta = assemble_metadata(
            SyncMethod::Iss,
            HideMethod::Identity,
            &data,
            256,
            &[],
            50,
            &mut prng,
        )
        .unwrap();
        // 8 header bits + 42 payload bits.
        assert_eq!(meta.bits, 50);
        assert_eq!(meta.bytes[0], 42);
    }

    #[test]
    fn metadata_rejects_headers_only_budget() {
        let mut prng = SequencePrng::new();
        prng.seed(b"meta").unwrap();
        let result = assemble_metadata(
            SyncMethod::ResHeader,
            HideMethod::Identity,
            &[0xAB],
            8,
            &[],
            16,
            &mut prng,
        );
        assert!(matches!(result, Err(StegoError::FrameSkip)));
    }

    #[test]
    fn extract_finds_res_header_frame() {
        let res_len = 256;
        let mut state = roomy_state(res_len);
        let mut residue = loud_residue(res_len);
        let floor = vec![0i32; res_len];
        measure_capacity(&mut state, &residue, 44_100).unwrap();
        state.prng.seed(b"frame").unwrap();
        state.calculate_lineup(res_len).unwrap();
        state.derive_keys(&[0, 1, 2, 3]).unwrap();

        let payload = [0x42u8, 0x99, 0x10];
        let pure = hide_data(
            &mut state,
            SyncMethod::ResHeader,
            &payload,
            payload.len() * 8,
            &floor,
            &mut residue,
            200,
        )
        .unwrap();
        assert_eq!(pure, 24);

        // Receiver side: same lineup, fresh pass over the lineup.
        let extracted = extract_subliminal(
            SyncMethod::ResHeader,
            HideMethod::Identity,
            &state.res_lineup,
            &floor,
            &residue,
            &mut state.prng,
        )
        .unwrap();
        assert_eq!(extracted.bits, 24);
        assert_eq!(&extracted.bytes[..3], &payload);
    }

    #[test]
    fn extract_reports_empty_for_unmarked_frames() {
        let res_len = 128;
        let mut state = roomy_state(res_len);
        let residue = loud_residue(res_len);
        state.prng.seed(b"noise").unwrap();
        state.calculate_lineup(res_len).unwrap();

        let extracted = extract_subliminal(
            SyncMethod::ResHeader,
            HideMethod::Identity,
            &state.res_lineup,
            &[],
            &residue,
            &mut state.prng,
        )
        .unwrap();
        // The first 8 natural bits are astronomically unlikely to be 0xFF
        // for this fixed residue; assert the empty outcome.
        assert_eq!(extracted.bits, 0);
    }
}
