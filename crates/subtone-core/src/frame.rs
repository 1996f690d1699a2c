//! Per-frame audio descriptors borrowed from the codec.

use crate::error::StegoError;

/// Highest number of floor posts a frame may carry.
pub const MAX_POSTS: usize = 65;

/// Codec-side description of one frame's floor geometry.
///
/// Borrowed for the duration of one frame's processing; the core never owns
/// codec data. `window` is the MDCT window length, so the residue and floor
/// vectors have `window / 2` elements.
#[derive(Debug, Clone, Copy)]
pub struct FloorLayout<'a> {
    /// Sample rate in Hz.
    pub rate: u32,
    /// MDCT window length in samples.
    pub window: usize,
    /// Floor-line quantization multiplier.
    pub mult: i32,
    /// X position of each floor post.
    pub post_list: &'a [i32],
    /// Post traversal order (sorted-by-x index).
    pub post_index: &'a [i32],
}

impl FloorLayout<'_> {
    /// Number of residue (and floor) lines in this frame.
    pub fn res_len(&self) -> usize {
        self.window / 2
    }

    /// Number of floor posts.
    pub fn posts_len(&self) -> usize {
        self.post_list.len()
    }

    pub(crate) fn validate(&self, posts: usize, floor: usize, residue: usize) -> Result<(), StegoError> {
        if self.rate == 0 || self.window < 2 || self.mult <= 0 {
            return Err(StegoError::InvalidArgument("degenerate floor layout"));
        }
        if self.post_list.len() != self.post_index.len() {
            return Err(StegoError::InvalidArgument("post list and index lengths differ"));
        }
        if self.post_list.len() < 2 || self.post_list.len() > MAX_POSTS {
            return Err(StegoError::InvalidArgument("post count out of range"));
        }
        if posts != self.post_list.len() {
            return Err(StegoError::InvalidArgument("posts vector length mismatch"));
        }
        if floor != self.res_len() || residue != self.res_len() {
            return Err(StegoError::InvalidArgument("floor/residue length mismatch"));
        }
        Ok(())
    }
}
