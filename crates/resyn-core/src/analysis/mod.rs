//! Spectral analysis - STFT frontend, peak extraction, partial tracking
//!
//! The analysis chain runs once per hop on the audio thread:
//! - StftAnalyzer: circular input FIFO, Hann window, forward real FFT
//! - PeakExtractor: local maxima with parabolic sub-bin interpolation
//! - PartialTracker: frame-to-frame peak identity (McAulay-Quatieri)

mod stft;
mod peaks;
mod tracker;

pub use stft::*;
pub use peaks::*;
pub use tracker::*;
