//! Engine error types
//!
//! Errors only exist on the control path: `prepare` can reject an invalid
//! configuration and leaves the engine unprepared (the audio path then
//! bypasses). The per-sample path is infallible.

use thiserror::Error;

/// Errors that can occur while configuring the engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Sample rate must be finite and positive
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f32),

    /// FFT order outside the supported range
    #[error("FFT order {0} outside supported range [{min}, {max}]",
            min = crate::types::MIN_FFT_ORDER,
            max = crate::types::MAX_FFT_ORDER)]
    InvalidFftOrder(u32),
}

/// Result type for engine configuration operations
pub type EngineResult<T> = Result<T, EngineError>;
