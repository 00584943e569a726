//! Main spectral resynthesis engine
//!
//! One engine instance processes one mono channel. The DSP state lives
//! behind a shared guard: control-thread operations (prepare, reset,
//! release, reconfiguration) lock it, while the audio thread only ever
//! *try*-locks on its way into `process_sample` and passes the input
//! through untouched whenever the guard is held. The audio thread never
//! waits, so a slow reconfiguration costs bypassed samples instead of a
//! blocked callback.
//!
//! ## Real-Time Safety
//!
//! Everything reachable from `process_sample` after `prepare` is
//! allocation-free: FIFOs and spectra are sized in `configure`, the peak
//! and track scratch containers are reserved up-front, and the per-frame
//! track copy reuses one pre-reserved vector.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::analysis::{PartialTrack, PartialTracker, PeakExtractor, StftAnalyzer};
use crate::error::{EngineError, EngineResult};
use crate::modifier::ModifierChain;
use crate::synth::OscillatorBank;
use crate::types::{Sample, DEFAULT_SAMPLE_RATE, MAX_ACTIVE_TRACKS, MAX_FFT_ORDER, MIN_FFT_ORDER};

use super::params::EngineParams;

/// All audio-thread-owned DSP state, guarded as one unit
struct DspCore {
    prepared: bool,
    sample_rate: f32,
    fft_order: u32,

    stft: StftAnalyzer,
    peaks: PeakExtractor,
    tracker: PartialTracker,
    modifiers: ModifierChain,
    bank: OscillatorBank,

    /// Per-frame working copy of the active tracks for the modifier chain
    frame_tracks: Vec<PartialTrack>,
}

impl DspCore {
    fn new() -> Self {
        Self {
            prepared: false,
            sample_rate: DEFAULT_SAMPLE_RATE,
            fft_order: 0,
            stft: StftAnalyzer::new(),
            peaks: PeakExtractor::new(),
            tracker: PartialTracker::new(),
            modifiers: ModifierChain::new(),
            bank: OscillatorBank::new(DEFAULT_SAMPLE_RATE),
            frame_tracks: Vec::with_capacity(MAX_ACTIVE_TRACKS),
        }
    }

    /// Build (or rebuild) all FFT-size-dependent state and zero everything
    ///
    /// Validates before touching state, so a failed configure leaves the
    /// previous configuration intact.
    fn configure(&mut self, sample_rate: f32, fft_order: u32) -> EngineResult<()> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(EngineError::InvalidSampleRate(sample_rate));
        }
        if !(MIN_FFT_ORDER..=MAX_FFT_ORDER).contains(&fft_order) {
            return Err(EngineError::InvalidFftOrder(fft_order));
        }

        let fft_size = 1usize << fft_order;

        self.sample_rate = sample_rate;
        self.fft_order = fft_order;
        self.stft.configure(fft_size);
        self.peaks.configure(self.stft.num_bins());
        self.tracker.reset();
        self.modifiers.reset();
        self.bank.prepare(sample_rate);
        self.frame_tracks.clear();
        self.prepared = true;
        Ok(())
    }

    /// Zero all runtime state, keeping the configuration
    fn reset(&mut self) {
        self.stft.reset();
        self.tracker.reset();
        self.modifiers.reset();
        self.bank.reset();
        self.frame_tracks.clear();
    }

    /// Deallocate FFT resources; `process_sample` bypasses until the next
    /// successful configure
    fn release(&mut self) {
        self.stft.release();
        self.tracker.reset();
        self.modifiers.reset();
        self.frame_tracks.clear();
        self.prepared = false;
    }

    #[inline]
    fn process_sample(&mut self, input: Sample, params: &EngineParams) -> Sample {
        if !self.prepared {
            return input;
        }

        let frame_due = self.stft.write_sample(input);
        let output = self.bank.tick();

        if frame_due {
            self.process_frame(params);
        }

        output
    }

    /// Run one analysis/update cycle at a hop boundary
    fn process_frame(&mut self, params: &EngineParams) {
        // Freeze suspends analysis; the tracker keeps its last state and
        // synthesis continues from it.
        if !params.freeze_enabled() {
            let spectrum = self.stft.analyze();
            let peaks = self
                .peaks
                .extract(spectrum, self.sample_rate, 1usize << self.fft_order);
            self.tracker.process_frame(peaks);
        }

        self.frame_tracks.clear();
        self.frame_tracks
            .extend_from_slice(self.tracker.active_tracks());

        let modifier_params = params.modifier_params();
        self.modifiers.apply(&modifier_params, &mut self.frame_tracks);

        self.bank.set_waveform(params.waveform_selected());
        self.bank.set_glide_time(params.glide_seconds());
        self.bank
            .update_from_partials(&self.frame_tracks, params.max_voices());
    }
}

/// Real-time spectral resynthesis engine for one mono channel
///
/// The handle is cheap to clone; clones share the same parameters and DSP
/// state, so one clone can live on the audio thread while another serves
/// the control thread.
///
/// ```
/// use resyn_core::SpectralEngine;
///
/// let engine = SpectralEngine::new();
/// engine.prepare(44_100.0, 512).unwrap();
///
/// let audio = engine.clone();
/// let _out = audio.process_sample(0.25);
/// ```
#[derive(Clone)]
pub struct SpectralEngine {
    params: Arc<EngineParams>,
    dsp: Arc<Mutex<DspCore>>,
}

impl SpectralEngine {
    pub fn new() -> Self {
        Self {
            params: Arc::new(EngineParams::new()),
            dsp: Arc::new(Mutex::new(DspCore::new())),
        }
    }

    /// Lock the DSP state from the control thread
    ///
    /// A poisoned guard only means an audio-thread panic already aborted the
    /// stream; the state itself is still consistent for teardown.
    fn lock_dsp(&self) -> MutexGuard<'_, DspCore> {
        self.dsp.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate and initialize for a stream at `sample_rate`
    ///
    /// `_max_block` is part of the host contract but unused: the engine is
    /// sample-oriented and keeps no block-sized storage. On error the engine
    /// is left unprepared and `process_sample` bypasses.
    pub fn prepare(&self, sample_rate: f32, _max_block: usize) -> EngineResult<()> {
        let mut dsp = self.lock_dsp();

        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            dsp.prepared = false;
            return Err(EngineError::InvalidSampleRate(sample_rate));
        }

        let order = self.params.fft_order_for(sample_rate);
        let result = dsp.configure(sample_rate, order);
        if result.is_err() {
            dsp.prepared = false;
        } else {
            log::debug!(
                "engine prepared: sample_rate={} fft_order={} fft_size={}",
                sample_rate,
                order,
                1usize << order
            );
        }
        result
    }

    /// Process one input sample and produce one output sample
    ///
    /// Audio-thread entry point. If the guard is held (reconfiguration in
    /// progress) or the engine is unprepared, the input passes through
    /// bit-identically.
    #[inline]
    pub fn process_sample(&self, input: Sample) -> Sample {
        match self.dsp.try_lock() {
            Ok(mut dsp) => dsp.process_sample(input, &self.params),
            Err(_) => input,
        }
    }

    /// Zero all runtime state without reallocating
    ///
    /// Smoothed voice values snap to their targets; track identities are
    /// not stable across a reset.
    pub fn reset(&self) {
        self.lock_dsp().reset();
        log::debug!("engine reset");
    }

    /// Release FFT/window resources; the engine bypasses until re-prepared
    pub fn release(&self) {
        self.lock_dsp().release();
        log::debug!("engine released");
    }

    /// Processing latency in samples (= FFT size) at the current
    /// configuration, 0 when unprepared
    pub fn latency_samples(&self) -> usize {
        let dsp = self.lock_dsp();
        if dsp.prepared {
            1usize << dsp.fft_order
        } else {
            0
        }
    }

    /// The dry input sample delayed by the reported latency
    ///
    /// For host wet/dry mixing; call from the audio thread after
    /// `process_sample`. Returns 0.0 while the guard is held.
    pub fn delayed_dry_sample(&self) -> Sample {
        match self.dsp.try_lock() {
            Ok(dsp) => dsp.stft.delayed_dry_sample(),
            Err(_) => 0.0,
        }
    }

    // --- Parameters ---

    /// Analysis window length; changing it across an FFT-order boundary
    /// rebuilds the engine under the guard
    pub fn set_slice(&self, value: f32) {
        self.params.set_slice(value);
        self.reconfigure_if_needed();
    }

    /// Maximum active oscillators (1..=33)
    pub fn set_voice(&self, value: f32) {
        self.params.set_voice(value);
    }

    /// Freeze analysis above 0.5; synthesis continues from the last frame
    pub fn set_freeze(&self, value: f32) {
        self.params.set_freeze(value);
    }

    /// Per-partial amplitude smearing
    pub fn set_blur(&self, value: f32) {
        self.params.set_blur(value);
    }

    /// Per-partial amplitude feedback
    pub fn set_feedback(&self, value: f32) {
        self.params.set_feedback(value);
    }

    /// Pitch warp, +/- 6 semitones around 0.5
    pub fn set_warp(&self, value: f32) {
        self.params.set_warp(value);
    }

    /// Frequency window center, log-mapped 20 Hz .. 20 kHz
    pub fn set_center_freq(&self, value: f32) {
        self.params.set_center_freq(value);
    }

    /// Frequency window width
    pub fn set_bandwidth(&self, value: f32) {
        self.params.set_bandwidth(value);
    }

    /// Fine shift, +/- 100 cents around 0.5
    pub fn set_freq(&self, value: f32) {
        self.params.set_freq(value);
    }

    /// Octave shift, +/- 2 octaves around 0.5
    pub fn set_octave(&self, value: f32) {
        self.params.set_octave(value);
    }

    /// Voice frequency glide time in seconds
    pub fn set_glide(&self, value: f32) {
        self.params.set_glide(value);
    }

    /// Oscillator shape selector
    pub fn set_waveform(&self, value: f32) {
        self.params.set_waveform(value);
    }

    /// Shared parameter surface, for hosts that drive atomics directly
    pub fn params(&self) -> &Arc<EngineParams> {
        &self.params
    }

    // --- Diagnostics (control thread; these lock) ---

    /// Snapshot of the live partial tracks
    pub fn partials(&self) -> Vec<PartialTrack> {
        self.lock_dsp().tracker.active_tracks().to_vec()
    }

    /// Number of voices currently sounding
    pub fn active_voice_count(&self) -> usize {
        self.lock_dsp().bank.active_voice_count()
    }

    /// Frequency a voice is gliding toward
    pub fn voice_target_frequency(&self, index: usize) -> Option<f32> {
        self.lock_dsp().bank.voice(index).map(|v| v.target_frequency())
    }

    /// Whether a voice is currently sounding
    pub fn voice_is_active(&self, index: usize) -> bool {
        self.lock_dsp()
            .bank
            .voice(index)
            .is_some_and(|v| v.is_active())
    }

    /// Re-derive the FFT order from the slice parameter and rebuild the
    /// DSP state if it changed. Runs on the control thread; the audio
    /// thread bypasses while the guard is held.
    fn reconfigure_if_needed(&self) {
        let mut dsp = self.lock_dsp();
        if !dsp.prepared {
            return;
        }

        let order = self.params.fft_order_for(dsp.sample_rate);
        if order == dsp.fft_order {
            return;
        }

        let sample_rate = dsp.sample_rate;
        if dsp.configure(sample_rate, order).is_ok() {
            log::debug!(
                "engine reconfigured: fft_order={} fft_size={}",
                order,
                1usize << order
            );
        }
    }
}

impl Default for SpectralEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    const SAMPLE_RATE: f32 = 44_100.0;
    /// Bin width at the default configuration (fft_size = 1024)
    const BIN_HZ: f32 = SAMPLE_RATE / 1024.0;

    fn prepared_engine() -> SpectralEngine {
        let engine = SpectralEngine::new();
        engine.prepare(SAMPLE_RATE, 512).expect("prepare");
        engine
    }

    /// Feed `seconds` of a unit sine at `freq` into the engine
    fn feed_sine(engine: &SpectralEngine, freq: f32, seconds: f32) -> Sample {
        let samples = (seconds * SAMPLE_RATE) as usize;
        let mut last = 0.0;
        for n in 0..samples {
            let x = (TAU * freq * n as f32 / SAMPLE_RATE).sin();
            last = engine.process_sample(x);
        }
        last
    }

    fn feed_silence(engine: &SpectralEngine, seconds: f32) -> Sample {
        let samples = (seconds * SAMPLE_RATE) as usize;
        let mut last = 0.0;
        for _ in 0..samples {
            last = engine.process_sample(0.0);
        }
        last
    }

    #[test]
    fn test_unprepared_engine_bypasses_bit_identically() {
        let engine = SpectralEngine::new();
        for &x in &[0.0, 1.0, -0.37, 1.0e-20, f32::MIN_POSITIVE] {
            assert_eq!(engine.process_sample(x), x);
        }
        assert_eq!(engine.latency_samples(), 0);
    }

    #[test]
    fn test_prepare_rejects_bad_sample_rate() {
        let engine = SpectralEngine::new();
        assert!(matches!(
            engine.prepare(0.0, 512),
            Err(EngineError::InvalidSampleRate(_))
        ));
        assert!(matches!(
            engine.prepare(f32::NAN, 512),
            Err(EngineError::InvalidSampleRate(_))
        ));
        // Still bypassing after the failed prepare
        assert_eq!(engine.process_sample(0.5), 0.5);
    }

    #[test]
    fn test_default_latency_is_1024_at_44100() {
        let engine = prepared_engine();
        assert_eq!(engine.latency_samples(), 1024);
    }

    #[test]
    fn test_silence_in_silence_out() {
        let engine = prepared_engine();
        for _ in 0..8192 {
            assert_eq!(engine.process_sample(0.0), 0.0);
        }
        assert!(engine.partials().is_empty());
        assert_eq!(engine.active_voice_count(), 0);
    }

    #[test]
    fn test_sine_is_tracked_and_resynthesized() {
        let engine = prepared_engine();
        // Bin-centered tone: sub-bin interpolation is exact by symmetry
        let tone = 10.0 * BIN_HZ;
        feed_sine(&engine, tone, 1.0);

        let partials = engine.partials();
        let best = partials
            .iter()
            .max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
            .expect("at least one partial");
        assert!(
            (best.frequency - tone).abs() < 1.0,
            "tracked {} Hz, expected {} Hz",
            best.frequency,
            tone
        );
        // Unit sine under a Hann window lands at ~0.25 normalized magnitude
        assert!(best.amplitude > 0.1);

        // Voice 0 carries the dominant partial
        let v0 = engine.voice_target_frequency(0).expect("voice 0");
        assert!((v0 - tone).abs() < 1.0);
        assert!(engine.voice_is_active(0));

        // The resynthesized output is audible
        let samples = 1024;
        let mut energy = 0.0;
        for n in 0..samples {
            let x = (TAU * tone * n as f32 / SAMPLE_RATE).sin();
            let y = engine.process_sample(x);
            energy += y * y;
        }
        let rms = (energy / samples as f32).sqrt();
        assert!(rms > 0.003, "output rms {rms} too small");
    }

    #[test]
    fn test_sweep_keeps_track_identity() {
        let engine = prepared_engine();
        // Glide across one bin's capture range so the sub-bin estimate
        // moves continuously from frame to frame
        let (f0, f1) = (10.6 * BIN_HZ, 11.4 * BIN_HZ);
        let seconds = 1.0;
        let total = (seconds * SAMPLE_RATE) as usize;

        let mut sweep_phase = 0.0_f32;
        let mut locked_id = None;

        for n in 0..total {
            let t = n as f32 / SAMPLE_RATE;
            let inst_freq = f0 + (f1 - f0) * t / seconds;
            sweep_phase += TAU * inst_freq / SAMPLE_RATE;
            if sweep_phase >= TAU {
                sweep_phase -= TAU;
            }
            engine.process_sample(sweep_phase.sin());

            // After the warmup, the dominant track must keep its identity
            if n % 4096 == 0 && n >= 8192 {
                let partials = engine.partials();
                let best = partials
                    .iter()
                    .max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
                    .expect("sweep partial");
                match locked_id {
                    None => locked_id = Some(best.track_id),
                    Some(id) => assert_eq!(best.track_id, id, "track identity changed mid-sweep"),
                }
                // The estimate stays within a bin of the sweep
                assert!(
                    (best.frequency - inst_freq).abs() < BIN_HZ,
                    "at {t:.2}s tracked {} Hz vs sweep {} Hz",
                    best.frequency,
                    inst_freq
                );
            }
        }
        assert!(locked_id.is_some());
    }

    #[test]
    fn test_tone_then_silence_empties_tracker() {
        let engine = prepared_engine();
        feed_sine(&engine, 10.0 * BIN_HZ, 1.0);
        assert!(!engine.partials().is_empty());

        let last = feed_silence(&engine, 0.5);
        assert!(engine.partials().is_empty());
        assert_eq!(engine.active_voice_count(), 0);
        assert!(last.abs() < 1e-4);
    }

    #[test]
    fn test_freeze_sustains_last_partials() {
        let engine = prepared_engine();
        let tone = 10.0 * BIN_HZ;
        feed_sine(&engine, tone, 0.5);

        engine.set_freeze(1.0);
        // Silence at the input: a frozen engine keeps sounding
        let samples = (0.25 * SAMPLE_RATE) as usize;
        let mut energy = 0.0;
        for _ in 0..samples {
            let y = engine.process_sample(0.0);
            energy += y * y;
        }
        let rms = (energy / samples as f32).sqrt();
        assert!(rms > 0.003, "frozen output rms {rms} too small");

        let v0 = engine.voice_target_frequency(0).expect("voice 0");
        assert!((v0 - tone).abs() < 1.0);

        // Releasing the freeze lets the silence drain the tracker
        engine.set_freeze(0.0);
        let last = feed_silence(&engine, 0.5);
        assert!(engine.partials().is_empty());
        assert!(last.abs() < 1e-4);
    }

    #[test]
    fn test_octave_up_doubles_voice_target() {
        let engine = prepared_engine();
        engine.set_octave(0.75); // +1 octave
        let tone = 5.0 * BIN_HZ;
        feed_sine(&engine, tone, 1.0);

        let v0 = engine.voice_target_frequency(0).expect("voice 0");
        assert!(
            (v0 - 2.0 * tone).abs() < 1.0,
            "voice 0 target {} Hz, expected {} Hz",
            v0,
            2.0 * tone
        );
    }

    #[test]
    fn test_frequency_window_excludes_low_partial() {
        let engine = prepared_engine();
        // Center the window on 2 kHz, narrowest bandwidth
        engine.set_center_freq(2.0 / 3.0);
        engine.set_bandwidth(0.0);

        let samples = SAMPLE_RATE as usize;
        for n in 0..samples {
            let t = n as f32 / SAMPLE_RATE;
            let x = 0.5 * (TAU * 200.0 * t).sin() + 0.5 * (TAU * 2000.0 * t).sin();
            engine.process_sample(x);
        }

        let mut saw_high = false;
        for i in 0..crate::types::NUM_VOICES {
            if !engine.voice_is_active(i) {
                continue;
            }
            let f = engine.voice_target_frequency(i).unwrap_or(0.0);
            assert!(
                !(150.0..=250.0).contains(&f),
                "200 Hz partial should be windowed out, voice {i} at {f} Hz"
            );
            if (1900.0..=2100.0).contains(&f) {
                saw_high = true;
            }
        }
        assert!(saw_high, "2 kHz partial should survive the window");
    }

    #[test]
    fn test_slice_change_reconfigures() {
        let engine = prepared_engine();
        feed_sine(&engine, 10.0 * BIN_HZ, 0.2);
        assert!(!engine.partials().is_empty());

        engine.set_slice(1.0);
        assert_eq!(engine.latency_samples(), 1 << MAX_FFT_ORDER);
        // Reconfiguration clears tracks; identities restart
        assert!(engine.partials().is_empty());

        // Engine keeps processing at the new size
        let last = feed_silence(&engine, 0.1);
        assert_eq!(last, 0.0);
    }

    #[test]
    fn test_reset_clears_tracks_and_output() {
        let engine = prepared_engine();
        feed_sine(&engine, 10.0 * BIN_HZ, 0.5);
        assert!(!engine.partials().is_empty());

        engine.reset();
        assert!(engine.partials().is_empty());
        assert_eq!(engine.process_sample(0.0), 0.0);
    }

    #[test]
    fn test_release_returns_to_bypass() {
        let engine = prepared_engine();
        feed_sine(&engine, 10.0 * BIN_HZ, 0.2);

        engine.release();
        assert_eq!(engine.latency_samples(), 0);
        assert_eq!(engine.process_sample(0.42), 0.42);

        // Re-preparing brings it back
        engine.prepare(SAMPLE_RATE, 512).expect("re-prepare");
        assert_eq!(engine.latency_samples(), 1024);
    }

    #[test]
    fn test_voice_cap_limits_active_voices() {
        let engine = prepared_engine();
        engine.set_voice(0.0); // a single voice
        // Rich input: square-ish sum of harmonics
        let samples = SAMPLE_RATE as usize / 2;
        for n in 0..samples {
            let t = n as f32 / SAMPLE_RATE;
            let x = (1..=9)
                .step_by(2)
                .map(|k| (TAU * 200.0 * k as f32 * t).sin() / k as f32)
                .sum::<f32>();
            engine.process_sample(x);
        }
        assert!(engine.active_voice_count() <= 1);
    }

    #[test]
    fn test_dry_delay_matches_latency() {
        let engine = prepared_engine();
        let latency = engine.latency_samples();

        for n in 0..(latency * 3) {
            engine.process_sample(n as f32);
            if n >= latency {
                assert_eq!(engine.delayed_dry_sample(), (n - latency) as f32);
            }
        }
    }

    #[test]
    fn test_active_track_invariants_hold() {
        use crate::analysis::MAX_FRAMES_DEAD;

        let engine = prepared_engine();
        let mut sweep_phase = 0.0_f32;
        for n in 0..(SAMPLE_RATE as usize) {
            let t = n as f32 / SAMPLE_RATE;
            // Tone that comes and goes, exercising fades and rebirths
            let gate = if (t * 4.0) as usize % 2 == 0 { 1.0 } else { 0.0 };
            sweep_phase += TAU * 500.0 / SAMPLE_RATE;
            engine.process_sample(gate * sweep_phase.sin());

            if n % 2048 == 0 {
                let partials = engine.partials();
                assert!(partials.len() <= MAX_ACTIVE_TRACKS);
                for track in &partials {
                    assert!(track.active);
                    assert!(track.frames_since_last_update <= MAX_FRAMES_DEAD);
                    // A just-born track may still be under the retirement
                    // threshold for one frame
                    assert!(track.amplitude > 0.0);
                    assert!(track.frames_since_creation >= 1);
                }
            }
        }
    }
}
