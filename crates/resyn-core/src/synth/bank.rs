//! Oscillator bank - 33 voices of additive resynthesis
//!
//! Voices are prepared once at stream setup and re-assigned from the
//! (modified) tracker output every frame. Per-sample work is a straight
//! sweep over the voice array: advance smoothers, read the oscillator,
//! accumulate. Output is normalized by `1/NUM_VOICES`.

use super::oscillator::{PhaseOscillator, Waveform};
use super::smoother::LinearSmoother;
use crate::analysis::PartialTrack;
use crate::types::{Sample, NUM_VOICES};

/// Fixed amplitude smoothing time (seconds)
const AMP_SMOOTH_SECS: f32 = 0.01;

/// A deactivating voice is switched off once its amplitude falls this low
const VOICE_OFF_THRESHOLD: f32 = 1e-3;

/// One synthesis slot: oscillator plus frequency/amplitude smoothers
pub struct Voice {
    oscillator: PhaseOscillator,
    frequency: LinearSmoother,
    amplitude: LinearSmoother,
    active: bool,
}

impl Voice {
    fn new(sample_rate: f32) -> Self {
        let mut amplitude = LinearSmoother::new();
        amplitude.set_ramp_time(AMP_SMOOTH_SECS, sample_rate);
        Self {
            oscillator: PhaseOscillator::new(sample_rate),
            frequency: LinearSmoother::new(),
            amplitude,
            active: false,
        }
    }

    /// Whether this voice currently contributes to the output
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Frequency the voice is gliding toward (diagnostic)
    pub fn target_frequency(&self) -> f32 {
        self.frequency.target()
    }

    /// Amplitude the voice is ramping toward (diagnostic)
    pub fn target_amplitude(&self) -> f32 {
        self.amplitude.target()
    }

    fn assign(&mut self, track: &PartialTrack) {
        self.frequency.set_target(track.frequency);
        self.amplitude.set_target(track.amplitude);
        self.active = track.active;
    }

    /// Ramp the amplitude to zero; the voice deactivates itself once the
    /// ramp falls under the off threshold
    fn release(&mut self) {
        self.amplitude.set_target(0.0);
    }

    #[inline]
    fn tick(&mut self) -> Sample {
        if !self.active {
            return 0.0;
        }

        self.oscillator.set_frequency(self.frequency.next());
        let sample = self.oscillator.next();
        let amp = self.amplitude.next();

        if self.amplitude.target() == 0.0 && amp < VOICE_OFF_THRESHOLD {
            self.active = false;
        }

        sample * amp
    }

    /// Snap smoothers to their targets and rewind the oscillator
    fn reset(&mut self) {
        self.frequency.snap_to_target();
        self.amplitude.snap_to_target();
        self.oscillator.reset_phase();
    }
}

/// The full additive synthesis bank
pub struct OscillatorBank {
    voices: [Voice; NUM_VOICES],
    waveform: Waveform,
    sample_rate: f32,
    output_gain: f32,
}

impl OscillatorBank {
    /// Create a bank prepared for `sample_rate`
    pub fn new(sample_rate: f32) -> Self {
        Self {
            voices: std::array::from_fn(|_| Voice::new(sample_rate)),
            waveform: Waveform::Sine,
            sample_rate,
            output_gain: 1.0 / NUM_VOICES as f32,
        }
    }

    /// Re-prepare every voice for a new sample rate and clear state
    ///
    /// Fresh voices start on sine; the next frame's bank update reapplies
    /// the selected waveform.
    pub fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.waveform = Waveform::Sine;
        for voice in &mut self.voices {
            *voice = Voice::new(sample_rate);
        }
    }

    /// Select the bank-wide waveform; sounding voices keep their phase
    pub fn set_waveform(&mut self, waveform: Waveform) {
        if waveform == self.waveform {
            return;
        }
        self.waveform = waveform;
        for voice in &mut self.voices {
            voice.oscillator.set_waveform(waveform);
        }
    }

    /// Set the frequency glide (portamento) time in seconds
    pub fn set_glide_time(&mut self, seconds: f32) {
        for voice in &mut self.voices {
            voice.frequency.set_ramp_time(seconds, self.sample_rate);
        }
    }

    /// Re-assign voices from this frame's modified track list
    ///
    /// The first `min(tracks, max_voices)` slots take the tracks in order;
    /// every remaining voice is released and fades itself out.
    pub fn update_from_partials(&mut self, tracks: &[PartialTrack], max_voices: usize) {
        let assigned = tracks.len().min(max_voices).min(NUM_VOICES);

        for (voice, track) in self.voices.iter_mut().zip(tracks.iter()).take(assigned) {
            voice.assign(track);
        }
        for voice in self.voices.iter_mut().skip(assigned) {
            voice.release();
        }
    }

    /// Generate one output sample from all active voices
    #[inline]
    pub fn tick(&mut self) -> Sample {
        let mut sum = 0.0;
        for voice in &mut self.voices {
            sum += voice.tick();
        }
        sum * self.output_gain
    }

    /// Number of voices currently producing sound
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Voice accessor for host metering and tests
    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    /// Snap all smoothers and rewind all oscillators
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
    }
}
