//! Engine orchestration - components, parameters, thread discipline
//!
//! This module ties the analysis chain, modifier chain and oscillator bank
//! into the two-operation surface the host sees (`prepare`, `process_sample`)
//! plus the control-thread operations (parameter setters, reset, release,
//! slice-driven reconfiguration).

mod params;
mod engine;

pub use params::*;
pub use engine::*;
