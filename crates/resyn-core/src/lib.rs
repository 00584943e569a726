//! Resyn Core - Real-time spectral resynthesis engine
//!
//! Reconstructs an input audio stream as the sum of a small bank of sinusoidal
//! oscillators whose frequencies and amplitudes follow dominant spectral peaks
//! tracked across consecutive STFT frames:
//!
//! ```text
//! sample in → input FIFO ─► every hop ─► window → FFT → peaks → tracker
//!                                                                  │
//!                                        modifiers → oscillator bank ─► sample out
//! ```
//!
//! One engine instance processes one mono channel; stereo hosts run two
//! independent instances. The host wrapper (device I/O, parameter UI,
//! dry/wet mix, output coloration) lives outside this crate.

pub mod types;
pub mod error;
pub mod analysis;
pub mod modifier;
pub mod synth;
pub mod engine;

pub use types::*;
pub use error::{EngineError, EngineResult};
pub use engine::{EngineParams, SpectralEngine};
