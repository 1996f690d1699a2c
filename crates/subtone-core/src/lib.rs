//! Subtone steganographic layer.
//!
//! Hides an authenticated byte stream inside the perceptually-masked
//! integer coefficients of an MDCT-based audio coder. Per frame, the
//! capacity analyzer measures how many bits each residue line can absorb
//! under the ITU-R BS.468-4 noise envelope, a key-derived permutation
//! scatters the bits across the lines, and a synchronization backend tells
//! the receiver whether the frame carries anything at all.
//!
//! ```text
//!            ┌────────────── crypto ring buffer ──────────────┐
//! packets ─► │ sender: capacity ► sync ► hide ► embed residue │ ─► frame
//! frame   ─► │ receiver: sync ► lineup ► extract ► un-hide    │ ─► packets
//!            └────────────────────────────────────────────────┘
//! ```
//!
//! Everything is synchronous and frame-sequential, driven from the codec's
//! encode/decode loop. The embedding carrier is never owned: the codec
//! lends its posts, floor and residue vectors for the duration of one
//! frame.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod capacity;
pub mod config;
pub mod error;
pub mod floor;
pub mod frame;
pub mod hide;
pub mod keys;
pub mod prng;
pub mod receiver;
pub mod sender;
pub mod state;
pub mod sync;
pub mod tolerance;

mod embed;

pub use capacity::{BITS_PER_COEFF, measure_capacity, target_usage_bits};
pub use config::SessionConfig;
pub use error::StegoError;
pub use floor::simulate_floor;
pub use frame::{FloorLayout, MAX_POSTS};
pub use hide::{BITS_PARITY, HideMethod};
pub use keys::{FrameKey, derive_frame_keys};
pub use prng::SequencePrng;
pub use receiver::{ExtractOutcome, ReceiverSession};
pub use sender::{EmbedOutcome, SenderSession};
pub use state::StegoState;
pub use sync::{
    MAX_SUBLIMINAL_SIZE, RES_HEADER_BITS, SIZE_FIELD_BITS, SYNCHRO_HEADER, SyncMethod,
    iss::{IssConfig, MarkBit},
};
pub use tolerance::variation_tolerance;
