//! Common types and constants for the resynthesis engine
//!
//! Everything in the engine is mono 32-bit float. The constants below pin the
//! analysis/synthesis geometry shared by the STFT analyzer, the partial
//! tracker and the oscillator bank.

/// Audio sample type (mono, 32-bit float)
pub type Sample = f32;

/// Default sample rate assumed before `prepare` reports the real one
pub const DEFAULT_SAMPLE_RATE: f32 = 44_100.0;

/// Number of oscillator voices in the synthesis bank
pub const NUM_VOICES: usize = 33;

/// Maximum spectral peaks extracted per analysis frame
pub const MAX_SPECTRAL_PEAKS: usize = 33;

/// Maximum partial tracks alive at any time (one per voice)
pub const MAX_ACTIVE_TRACKS: usize = 33;

/// STFT overlap factor: hop = fft_size / OVERLAP (75% overlap)
pub const OVERLAP: usize = 4;

/// Smallest supported FFT order (2^7 = 128 samples)
pub const MIN_FFT_ORDER: u32 = 7;

/// Largest supported FFT order (2^14 = 16384 samples)
pub const MAX_FFT_ORDER: u32 = 14;

/// Shortest analysis window the slice control maps to, in milliseconds
pub const MIN_SLICE_MS: f32 = 17.0;

/// Longest analysis window the slice control maps to, in milliseconds
pub const MAX_SLICE_MS: f32 = 6400.0;
