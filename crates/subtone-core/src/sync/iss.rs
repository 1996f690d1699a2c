//! Improved Spread Spectrum floor-post watermark.
//!
//! After Malvar & Florencio, "Improved Spread Spectrum: a new modulation
//! technique for robust watermarking". A ±σ sequence drawn from the
//! synchro subkey marks the posts with one presence bit; the host-signal
//! interference is partially cancelled through the λ feedback term. The
//! sender additionally simulates the decoder's floor curve and walks the
//! watermark back wherever it would breach the ITU-R BS.468-4 envelope.

use tracing::{debug, trace};

use crate::{
    error::StegoError,
    floor::{db_amp, render_line, simulate_floor},
    frame::FloorLayout,
    hide::{self, HideMethod},
    keys::FrameKey,
    prng::SequencePrng,
    sync::SIZE_FIELD_BITS,
    tolerance::variation_tolerance,
};

/// Post value bits; bit 15 is the codec's step-2 flag.
const POST_VALUE_MASK: i32 = 0x7fff;

/// Presence bit read from a marked frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkBit {
    /// Projection is negative: the frame claims no data.
    Zero,
    /// Projection is positive: the frame claims data.
    One,
    /// Projection is exactly zero: no statistical evidence either way.
    Indeterminate,
}

/// Per-frame ISS parameters: watermark sequence and modulation constants.
#[derive(Debug, Clone)]
pub struct IssConfig {
    /// Embedding strength (α in `x + (αb − λr)·u`).
    pub alpha: f32,
    /// Host-interference cancellation (λ).
    pub lambda: f32,
    /// Watermark deviation.
    pub sigma: f32,
    u: Vec<f32>,
    u_norm: f32,
}

impl IssConfig {
    /// Derive the watermark and the optimal (α, λ) for this frame's posts.
    ///
    /// Seeds the PRNG from the synchro subkey, so the sequence is
    /// reproducible on both sides. Constant posts (zero variance) have no
    /// host interference to cancel: λ degenerates to 0 and the mark is
    /// purely additive.
    ///
    /// # Errors
    ///
    /// - `StegoError::InvalidArgument` on empty posts or `sigma <= 0`.
    pub fn derive(
        posts: &[i32],
        sigma: f32,
        synchro_key: &FrameKey,
        prng: &mut SequencePrng,
    ) -> Result<Self, StegoError> {
        if posts.is_empty() {
            return Err(StegoError::InvalidArgument("empty posts vector"));
        }
        if sigma <= 0.0 {
            return Err(StegoError::InvalidArgument("sigma must be positive"));
        }

        let n = posts.len() as f32;
        let u_var = sigma * sigma;

        let mean = posts.iter().map(|p| (p & POST_VALUE_MASK) as f32).sum::<f32>() / n;
        let variance = posts
            .iter()
            .map(|p| {
                let v = (p & POST_VALUE_MASK) as f32 - mean;
                v * v
            })
            .sum::<f32>()
            / n;

        // Formulae (20) and (33) from the paper, with a noiseless channel.
        let (lambda, alpha) = if variance > 0.0 {
            let ratio = n * u_var / variance;
            let head = 1.0 + ratio;
            let lambda = 0.5 * (head - (head * head - 4.0 * ratio).max(0.0).sqrt());
            let alpha = (1.0 - lambda * lambda * variance / (n * u_var)).max(0.0).sqrt();
            (lambda, alpha)
        } else {
            (0.0, 1.0)
        };

        prng.seed(synchro_key.as_bytes())?;
        let mut u = Vec::with_capacity(posts.len());
        let mut u_norm = 0.0f32;
        for _ in 0..posts.len() {
            let flip = prng.next(2)?;
            u.push(if flip == 1 { sigma } else { -sigma });
            u_norm += sigma * sigma;
        }

        Ok(Self { alpha, lambda, sigma, u, u_norm })
    }

    fn projection(&self, work: &[i32]) -> f32 {
        let mean = work.iter().sum::<i32>() as f32 / work.len() as f32;
        let mut r = 0.0f32;
        for (w, u) in work.iter().zip(&self.u) {
            r += (*w as f32 - mean) * u;
        }
        r / self.u_norm
    }
}

/// Read the presence bit from a (possibly marked) posts vector.
pub fn read_mark(posts: &[i32], cfg: &IssConfig) -> MarkBit {
    let work: Vec<i32> = posts.iter().map(|p| p & POST_VALUE_MASK).collect();
    let r = cfg.projection(&work);
    match r.partial_cmp(&0.0) {
        Some(std::cmp::Ordering::Less) => MarkBit::Zero,
        Some(std::cmp::Ordering::Greater) => MarkBit::One,
        _ => {
            debug!("no statistical evidence of a watermark");
            MarkBit::Indeterminate
        },
    }
}

/// Mark the posts with `bit`, keeping the decoded floor inside the ITU
/// envelope.
///
/// Naturally aligned frames (`b·r > α/λ`) commit unmodified. Otherwise the
/// linear ISS update applies, the decoder's floor is re-rendered segment by
/// segment, and wherever the envelope is breached the segment endpoints
/// walk back toward their original values one quantum at a time, keeping
/// their direction. Commits only if the final projection still carries the
/// intended sign.
///
/// # Errors
///
/// - `StegoError::SyncFail` when the posts cannot carry `bit`; they are
///   left untouched.
pub fn write_mark(
    layout: &FloorLayout<'_>,
    posts: &mut [i32],
    bit: bool,
    cfg: &IssConfig,
) -> Result<(), StegoError> {
    let posts_len = posts.len();
    let res_len = layout.res_len();
    if posts_len < 2 || res_len == 0 {
        return Err(StegoError::InvalidArgument("degenerate posts vector"));
    }
    if layout.post_index.iter().any(|&ix| ix < 0 || ix as usize >= posts_len) {
        return Err(StegoError::InvalidArgument("post index out of range"));
    }
    let b: f32 = if bit { 1.0 } else { -1.0 };

    let mut floor_ref = vec![0i32; res_len];
    simulate_floor(layout, posts, &mut floor_ref)?;

    let mut work: Vec<i32> = posts.iter().map(|p| p & POST_VALUE_MASK).collect();
    let r = cfg.projection(&work);

    // Naturally aligned beyond the modulation threshold: nothing to do.
    if cfg.lambda > 0.0 && b * r > cfg.alpha / cfg.lambda {
        posts.copy_from_slice(&work);
        return Ok(());
    }

    // Linear ISS update, rounded and clamped to the quantized post range.
    for (w, u) in work.iter_mut().zip(&cfg.u) {
        let variation = ((cfg.alpha * b - cfg.lambda * r) * u).round() as i32;
        let candidate = *w + variation;
        if (0..=255).contains(&candidate) {
            *w = candidate;
        }
    }

    // Re-render the decoder's floor segment by segment; on an envelope
    // breach walk the segment endpoints back and redo that segment.
    let bin_hz = layout.rate as f32 / layout.window as f32;
    let mut floor_new = vec![0i32; res_len];
    let mut lx = 0i32;
    let mut ly = work[0] * layout.mult;
    let mut i = 1usize;
    while i < posts_len {
        floor_new.iter_mut().for_each(|v| *v = 0);

        let previous = layout.post_index[i - 1] as usize;
        let current = layout.post_index[i] as usize;
        let hy = work[current] * layout.mult;
        let hx = layout.post_list[current];
        render_line(lx, hx, ly, hy, &mut floor_new);

        let mut remake = false;
        for j in lx.max(0)..hx {
            let j_idx = j as usize;
            if j_idx >= res_len {
                break;
            }
            let envelope = variation_tolerance(j as f32 * bin_hz, db_amp(floor_ref[j_idx]))?;
            let rendered = db_amp(floor_new[j_idx]);
            let reference = db_amp(floor_ref[j_idx]);
            if rendered < reference + envelope[0] || rendered > reference + envelope[1] {
                let lx_ref = db_amp(floor_ref[(lx.max(0) as usize).min(res_len - 1)]);
                remake |= pull_back(
                    &mut work[previous],
                    posts[previous] & POST_VALUE_MASK,
                    variation_tolerance(lx.max(0) as f32 * bin_hz, lx_ref)?,
                );

                let hx_ref = if i == posts_len - 1 {
                    db_amp(posts[1] & POST_VALUE_MASK)
                } else {
                    db_amp(floor_ref[(hx.max(0) as usize).min(res_len - 1)])
                };
                remake |= pull_back(
                    &mut work[current],
                    posts[current] & POST_VALUE_MASK,
                    variation_tolerance(hx.max(0) as f32 * bin_hz, hx_ref)?,
                );

                if remake {
                    break;
                }
            }
        }

        if remake {
            continue;
        }
        lx = hx;
        ly = hy;
        i += 1;
    }

    // The mark only counts if a decoder would read it back.
    let r = cfg.projection(&work);
    if (r < 0.0 && !bit) || (r > 0.0 && bit) {
        posts.copy_from_slice(&work);
        trace!(bit, "committed ISS mark");
        Ok(())
    } else {
        debug!(bit, "posts resist the mark, leaving them untouched");
        Err(StegoError::SyncFail)
    }
}

/// Walk one endpoint back toward its original value while it breaches the
/// envelope, preserving the watermark's direction. Returns whether it
/// moved.
fn pull_back(value: &mut i32, original: i32, envelope: [f32; 2]) -> bool {
    let before = *value;
    let reference = db_amp(original);
    if *value > original {
        while db_amp(*value) > reference + envelope[1] && *value > original {
            *value -= 1;
        }
    } else {
        while db_amp(*value) < reference + envelope[0] && *value < original {
            *value += 1;
        }
    }
    before != *value
}

/// Make an empty ISS frame read as empty.
///
/// The receiver of a marked-looking frame reads a size field first, so
/// force the first [`SIZE_FIELD_BITS`] residues to carry the pre-hidden
/// zero size: each gets a two-valued magnitude whose single payload bit is
/// one hidden zero bit.
///
/// # Errors
///
/// - `StegoError::InvalidArgument` when the frame has fewer lines than the
///   size field needs.
pub fn desynchronize(
    hide_method: HideMethod,
    floor: &[i32],
    lineup: &[usize],
    residue: &mut [i32],
    prng: &mut SequencePrng,
) -> Result<(), StegoError> {
    if lineup.len() < SIZE_FIELD_BITS {
        return Err(StegoError::InvalidArgument("frame too small to desynchronize"));
    }

    let mut zero_size = [0u8; 1];
    hide::apply(hide_method, &mut zero_size, SIZE_FIELD_BITS, floor, prng)?;

    for (i, &pos) in lineup.iter().take(SIZE_FIELD_BITS).enumerate() {
        let bit = i32::from((zero_size[0] >> (7 - i)) & 1);
        let value = 0x2 | bit;
        residue[pos] = if residue[pos] < 0 { -value } else { value };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::derive_frame_keys;

    fn synchro_key() -> FrameKey {
        let (_, synchro) = derive_frame_keys(&[0x77u8; 16], &[0, 1, 2, 3, 4]).unwrap();
        synchro
    }

    fn layout<'a>(post_list: &'a [i32], post_index: &'a [i32]) -> FloorLayout<'a> {
        FloorLayout { rate: 44_100, window: 256, mult: 1, post_list, post_index }
    }

    #[test]
    fn constant_posts_give_indeterminate_mark() {
        let posts = vec![128i32; 16];
        let mut prng = SequencePrng::new();
        let cfg = IssConfig::derive(&posts, 1.0, &synchro_key(), &mut prng).unwrap();

        assert_eq!(read_mark(&posts, &cfg), MarkBit::Indeterminate);
    }

    #[test]
    fn shifting_along_the_watermark_flips_the_projection() {
        let posts = vec![128i32; 16];
        let mut prng = SequencePrng::new();
        let cfg = IssConfig::derive(&posts, 1.0, &synchro_key(), &mut prng).unwrap();

        let marked: Vec<i32> =
            posts.iter().zip(&cfg.u).map(|(p, u)| p + u.round() as i32).collect();
        assert_eq!(read_mark(&marked, &cfg), MarkBit::One);

        let inverted: Vec<i32> =
            posts.iter().zip(&cfg.u).map(|(p, u)| p - u.round() as i32).collect();
        assert_eq!(read_mark(&inverted, &cfg), MarkBit::Zero);
    }

    #[test]
    fn written_mark_reads_back() {
        let post_list = [0i32, 128, 32, 64, 96];
        let post_index = [0i32, 2, 3, 4, 1];
        let layout = layout(&post_list, &post_index);
        let mut posts = vec![100i32, 104, 98, 102, 101];

        let mut prng = SequencePrng::new();
        let cfg = IssConfig::derive(&posts, 1.0, &synchro_key(), &mut prng).unwrap();

        match write_mark(&layout, &mut posts, true, &cfg) {
            Ok(()) => assert_eq!(read_mark(&posts, &cfg), MarkBit::One),
            Err(StegoError::SyncFail) => {
                // The backend declined; the posts must be untouched.
                assert_eq!(posts, vec![100, 104, 98, 102, 101]);
            },
            Err(other) => unreachable!("unexpected error: {other}"),
        }
    }

    #[test]
    fn derive_is_reproducible_across_peers() {
        let posts = vec![90i32, 110, 95, 105, 100, 101];
        let key = synchro_key();
        let mut prng_a = SequencePrng::new();
        let mut prng_b = SequencePrng::new();
        let a = IssConfig::derive(&posts, 1.5, &key, &mut prng_a).unwrap();
        let b = IssConfig::derive(&posts, 1.5, &key, &mut prng_b).unwrap();
        assert_eq!(a.u, b.u);
        assert!((a.alpha - b.alpha).abs() < f32::EPSILON);
        assert!((a.lambda - b.lambda).abs() < f32::EPSILON);
    }

    #[test]
    fn lambda_and_alpha_are_well_formed() {
        let posts = vec![80i32, 120, 100, 90, 110, 100, 95, 105];
        let mut prng = SequencePrng::new();
        let cfg = IssConfig::derive(&posts, 1.0, &synchro_key(), &mut prng).unwrap();
        assert!(cfg.lambda >= 0.0 && cfg.lambda <= 1.0 + 1e-6);
        assert!(cfg.alpha >= 0.0 && cfg.alpha <= 1.0 + 1e-6);
    }

    #[test]
    fn desynchronize_forces_a_zero_size_field() {
        let res_len = 64usize;
        let mut residue: Vec<i32> = (0..res_len as i32).map(|i| 500 + i).collect();
        residue[10] = -600;
        let lineup: Vec<usize> = (0..res_len).collect();
        let mut prng = SequencePrng::new();
        prng.seed(b"desync").unwrap();

        desynchronize(HideMethod::Identity, &[], &lineup, &mut residue, &mut prng).unwrap();

        // The first eight lines carry exactly one zero bit each.
        for &pos in lineup.iter().take(8) {
            assert_eq!(residue[pos].abs(), 2);
        }
        // Signs survive.
        assert!(residue[10] < 0 || lineup[..8].iter().all(|p| *p != 10));
    }
}
