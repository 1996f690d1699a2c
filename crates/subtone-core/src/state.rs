//! Session-scoped steganographic state.

use subtone_crypto::SecretKey;

use crate::{
    config::SessionConfig,
    error::StegoError,
    hide::HideMethod,
    keys::{FrameKey, derive_frame_keys},
    prng::SequencePrng,
    sync::SyncMethod,
};

/// Mutable state of one steganographic session.
///
/// Long-lived fields (keys, counters, the aggressiveness controller) span
/// the session; the capacity vectors, lineup, occupancy and frame subkeys
/// are reset at every frame.
///
/// # Invariants
///
/// - `res_lineup` is a permutation of `[0, res_len)` once `aligned` holds;
///   `res_occupied[i]` is set iff `i` was emitted into the lineup.
/// - `sent % 8` is the bit offset inside the current source byte.
pub struct StegoState {
    pub(crate) hide_method: HideMethod,
    pub(crate) sync_method: SyncMethod,
    pub(crate) da: u32,
    pub(crate) ra: f32,
    pub(crate) sigma: f32,
    pub(crate) variation_limit: Vec<[f32; 2]>,
    pub(crate) max_fc_capacity: u64,
    pub(crate) min_fc_capacity: u64,
    pub(crate) res_max_capacity: Vec<u32>,
    pub(crate) res_min_capacity: Vec<u32>,
    pub(crate) res_lineup: Vec<usize>,
    pub(crate) res_occupied: Vec<bool>,
    pub(crate) aligned: bool,
    pub(crate) sent: u64,
    pub(crate) read: u64,
    pub(crate) metadata_sent: u64,
    pub(crate) total_sub_capacity: u64,
    pub(crate) frames: u64,
    pub(crate) prng: SequencePrng,
    pub(crate) hiding_key: Option<FrameKey>,
    pub(crate) synchro_key: Option<FrameKey>,
    master_key: SecretKey,
}

impl StegoState {
    /// Validate the configuration and build the session state.
    ///
    /// # Errors
    ///
    /// - `StegoError::InvalidArgument` for aggressiveness outside `1..=10`,
    ///   a non-positive sigma under ISS, a short master key, or the
    ///   forced-residue-header mode (which is per-frame only).
    pub fn new(config: &SessionConfig) -> Result<Self, StegoError> {
        if !(1..=10).contains(&config.aggressiveness) {
            return Err(StegoError::InvalidArgument("aggressiveness must be in 1..=10"));
        }
        if config.sync_method == SyncMethod::ForcedResHeader {
            return Err(StegoError::InvalidArgument(
                "forced residue header is a per-frame fallback, not a session mode",
            ));
        }
        if config.sync_method == SyncMethod::Iss && config.sigma <= 0.0 {
            return Err(StegoError::InvalidArgument("ISS sigma must be positive"));
        }
        if config.key.len() < 16 {
            return Err(StegoError::InvalidArgument("master key must be at least 16 bytes"));
        }

        Ok(Self {
            hide_method: config.hide_method,
            sync_method: config.sync_method,
            da: config.aggressiveness,
            ra: config.aggressiveness as f32,
            sigma: config.sigma,
            variation_limit: Vec::new(),
            max_fc_capacity: 0,
            min_fc_capacity: 0,
            res_max_capacity: Vec::new(),
            res_min_capacity: Vec::new(),
            res_lineup: Vec::new(),
            res_occupied: Vec::new(),
            aligned: false,
            sent: 0,
            read: 0,
            metadata_sent: 0,
            total_sub_capacity: 0,
            frames: 0,
            prng: SequencePrng::new(),
            hiding_key: None,
            synchro_key: None,
            master_key: SecretKey::new(&config.key)?,
        })
    }

    /// Reset the per-frame fields for a frame with `res_len` residue lines.
    pub(crate) fn reset_frame(&mut self, res_len: usize) {
        self.variation_limit.clear();
        self.variation_limit.resize(res_len, [0.0, 0.0]);
        self.res_max_capacity.clear();
        self.res_max_capacity.resize(res_len, 0);
        self.res_min_capacity.clear();
        self.res_min_capacity.resize(res_len, 0);
        self.res_lineup.clear();
        self.res_lineup.resize(res_len, 0);
        self.res_occupied.clear();
        self.res_occupied.resize(res_len, false);
        self.max_fc_capacity = 0;
        self.min_fc_capacity = 0;
        self.aligned = false;
        self.hiding_key = None;
        self.synchro_key = None;
        self.frames += 1;
    }

    /// Derive this frame's subkeys from the post ordering. Seeding the
    /// PRNG stays with the caller; the two sides do it at different steps.
    pub(crate) fn derive_keys(&mut self, post_index: &[i32]) -> Result<(), StegoError> {
        let (hiding, synchro) = derive_frame_keys(self.master_key.as_bytes(), post_index)?;
        self.hiding_key = Some(hiding);
        self.synchro_key = Some(synchro);
        Ok(())
    }

    /// Copy of the hiding subkey bytes, for PRNG seeding and rewinds.
    pub(crate) fn hiding_seed(&self) -> Result<[u8; 16], StegoError> {
        self.hiding_key
            .as_ref()
            .map(|k| *k.as_bytes())
            .ok_or(StegoError::Internal("frame keys not derived"))
    }

    /// Build the pseudo-random residue traversal order for this frame.
    ///
    /// Draws indices from the PRNG, skipping already-chosen ones, until
    /// every coefficient appears exactly once. Both peers replay the same
    /// rejection sequence, so the permutations agree.
    pub(crate) fn calculate_lineup(&mut self, res_len: usize) -> Result<(), StegoError> {
        if res_len == 0 {
            return Err(StegoError::InvalidArgument("empty residue vector"));
        }
        self.res_lineup.iter_mut().for_each(|slot| *slot = 0);
        self.res_occupied.iter_mut().for_each(|slot| *slot = false);

        let mut placed = 0;
        while placed < res_len {
            let candidate = self.prng.next(res_len as u32)? as usize;
            if !self.res_occupied[candidate] {
                self.res_lineup[placed] = candidate;
                self.res_occupied[candidate] = true;
                placed += 1;
            }
        }
        self.aligned = true;
        Ok(())
    }

    /// Running aggressiveness, in tenths of capacity actually used.
    pub fn real_aggressiveness(&self) -> f32 {
        self.ra
    }

    /// Pure payload bits embedded so far (sender side).
    pub fn bits_sent(&self) -> u64 {
        self.sent
    }

    /// Pure payload bits recovered so far (receiver side).
    pub fn bits_read(&self) -> u64 {
        self.read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig { key: vec![9u8; 16], ..SessionConfig::default() }
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        let mut bad = config();
        bad.aggressiveness = 0;
        assert!(StegoState::new(&bad).is_err());

        let mut bad = config();
        bad.aggressiveness = 11;
        assert!(StegoState::new(&bad).is_err());

        let mut bad = config();
        bad.key = vec![1; 8];
        assert!(StegoState::new(&bad).is_err());

        let mut bad = config();
        bad.sync_method = SyncMethod::Iss;
        bad.sigma = 0.0;
        assert!(StegoState::new(&bad).is_err());

        let mut bad = config();
        bad.sync_method = SyncMethod::ForcedResHeader;
        assert!(StegoState::new(&bad).is_err());
    }

    #[test]
    fn lineup_is_a_permutation() {
        let mut state = StegoState::new(&config()).unwrap();
        state.reset_frame(64);
        state.prng.seed(b"lineup-seed").unwrap();
        state.calculate_lineup(64).unwrap();

        let mut seen = vec![false; 64];
        for &pos in &state.res_lineup {
            assert!(!seen[pos], "index {pos} repeated");
            seen[pos] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert!(state.res_occupied.iter().all(|o| *o));
        assert!(state.aligned);
    }

    #[test]
    fn lineup_is_reproducible_across_peers() {
        let mut a = StegoState::new(&config()).unwrap();
        let mut b = StegoState::new(&config()).unwrap();
        for state in [&mut a, &mut b] {
            state.reset_frame(128);
            state.prng.seed(&[0xC0, 0xFF, 0xEE, 0x00]).unwrap();
            state.calculate_lineup(128).unwrap();
        }
        assert_eq!(a.res_lineup, b.res_lineup);
    }

    #[test]
    fn frame_reset_clears_ephemeral_state() {
        let mut state = StegoState::new(&config()).unwrap();
        state.reset_frame(16);
        state.prng.seed(&[1, 2, 3, 4]).unwrap();
        state.calculate_lineup(16).unwrap();
        state.derive_keys(&[0, 1, 2]).unwrap();

        state.reset_frame(8);
        assert!(!state.aligned);
        assert!(state.hiding_key.is_none());
        assert_eq!(state.res_lineup.len(), 8);
        assert_eq!(state.max_fc_capacity, 0);
    }
}
