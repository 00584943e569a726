//! Lock-free engine parameters
//!
//! All twelve controls are normalized floats in `[0, 1]`, stored as
//! bit-cast `AtomicU32` so the control thread can write and the audio
//! thread can read every sample without locks. Relaxed ordering is
//! sufficient: no cross-parameter consistency is required, and changes
//! take effect on the next sample boundary.
//!
//! Out-of-range and non-finite writes are clamped at ingress, so every
//! observable state corresponds to some in-range setting.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::modifier::ModifierParams;
use crate::synth::Waveform;
use crate::types::{MAX_FFT_ORDER, MAX_SLICE_MS, MIN_FFT_ORDER, MIN_SLICE_MS, NUM_VOICES};

/// One normalized parameter stored as f32 bits
struct AtomicParam(AtomicU32);

impl AtomicParam {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn set(&self, value: f32) {
        let clamped = if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        };
        self.0.store(clamped.to_bits(), Ordering::Relaxed);
    }

    fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// The engine's shared control surface
///
/// Written by the control thread, read by the audio thread; see the module
/// docs for the memory-ordering contract. Defaults match a transparent
/// resynthesis: every pitch control neutral, window wide open.
pub struct EngineParams {
    slice: AtomicParam,
    voice: AtomicParam,
    freeze: AtomicParam,
    blur: AtomicParam,
    feedback: AtomicParam,
    warp: AtomicParam,
    center_freq: AtomicParam,
    bandwidth: AtomicParam,
    freq: AtomicParam,
    octave: AtomicParam,
    glide: AtomicParam,
    waveform: AtomicParam,
}

impl EngineParams {
    pub fn new() -> Self {
        Self {
            slice: AtomicParam::new(0.1),
            voice: AtomicParam::new(1.0),
            freeze: AtomicParam::new(0.0),
            blur: AtomicParam::new(0.0),
            feedback: AtomicParam::new(0.0),
            warp: AtomicParam::new(0.5),
            center_freq: AtomicParam::new(0.5),
            bandwidth: AtomicParam::new(1.0),
            freq: AtomicParam::new(0.5),
            octave: AtomicParam::new(0.5),
            glide: AtomicParam::new(0.01),
            waveform: AtomicParam::new(0.0),
        }
    }

    // Setters - clamped at ingress, relaxed stores.

    pub fn set_slice(&self, value: f32) {
        self.slice.set(value);
    }
    pub fn set_voice(&self, value: f32) {
        self.voice.set(value);
    }
    pub fn set_freeze(&self, value: f32) {
        self.freeze.set(value);
    }
    pub fn set_blur(&self, value: f32) {
        self.blur.set(value);
    }
    pub fn set_feedback(&self, value: f32) {
        self.feedback.set(value);
    }
    pub fn set_warp(&self, value: f32) {
        self.warp.set(value);
    }
    pub fn set_center_freq(&self, value: f32) {
        self.center_freq.set(value);
    }
    pub fn set_bandwidth(&self, value: f32) {
        self.bandwidth.set(value);
    }
    pub fn set_freq(&self, value: f32) {
        self.freq.set(value);
    }
    pub fn set_octave(&self, value: f32) {
        self.octave.set(value);
    }
    pub fn set_glide(&self, value: f32) {
        self.glide.set(value);
    }
    pub fn set_waveform(&self, value: f32) {
        self.waveform.set(value);
    }

    // Raw getters.

    pub fn slice(&self) -> f32 {
        self.slice.get()
    }
    pub fn voice(&self) -> f32 {
        self.voice.get()
    }
    pub fn freeze(&self) -> f32 {
        self.freeze.get()
    }
    pub fn glide(&self) -> f32 {
        self.glide.get()
    }
    pub fn waveform(&self) -> f32 {
        self.waveform.get()
    }

    // Derived mappings.

    /// FFT order the slice control selects at `sample_rate`
    ///
    /// The slice sweeps the analysis window from 17 ms to 6.4 s on a log
    /// scale; the nearest power-of-two window is chosen and clamped to the
    /// supported order range.
    pub fn fft_order_for(&self, sample_rate: f32) -> u32 {
        let slice = self.slice.get();
        let seconds = MIN_SLICE_MS * (MAX_SLICE_MS / MIN_SLICE_MS).powf(slice) / 1000.0;
        let order = (seconds * sample_rate).log2().round() as i64;
        order.clamp(MIN_FFT_ORDER as i64, MAX_FFT_ORDER as i64) as u32
    }

    /// Maximum simultaneously sounding oscillators, 1..=NUM_VOICES
    pub fn max_voices(&self) -> usize {
        ((self.voice.get() * (NUM_VOICES - 1) as f32) as usize + 1).min(NUM_VOICES)
    }

    /// Whether analysis is frozen (boolean threshold at 0.5)
    pub fn freeze_enabled(&self) -> bool {
        self.freeze.get() > 0.5
    }

    /// Selected oscillator shape
    pub fn waveform_selected(&self) -> Waveform {
        Waveform::from_normalized(self.waveform.get())
    }

    /// Frequency glide time in seconds
    pub fn glide_seconds(&self) -> f32 {
        self.glide.get()
    }

    /// Snapshot the modifier configuration for one frame
    pub fn modifier_params(&self) -> ModifierParams {
        ModifierParams {
            center_freq: self.center_freq.get(),
            bandwidth: self.bandwidth.get(),
            blur: self.blur.get(),
            feedback: self.feedback.get(),
            warp: self.warp.get(),
            freq: self.freq.get(),
            octave: self.octave.get(),
        }
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        Self::new()
    }
}
