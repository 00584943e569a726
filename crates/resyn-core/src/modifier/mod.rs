//! Per-partial spectral modifiers
//!
//! Operates on a mutable copy of the tracker's active set once per frame,
//! before the oscillator bank is updated. The chain applies in a fixed
//! order: frequency window -> blur -> feedback -> warp -> fine shift ->
//! octave. Track ids key the sparse blur/feedback state so a partial keeps
//! its modifier history for as long as it lives.

mod sparse;

pub use sparse::SparseTrackMap;

use crate::analysis::PartialTrack;
use crate::types::MAX_ACTIVE_TRACKS;

/// Feedback state decays by this factor each frame before mixing
const FEEDBACK_DECAY: f32 = 0.97;

/// Sparse maps are swept once they hold this many times the live track cap
const PRUNE_WATERMARK_FACTOR: usize = 4;

/// Modifier configuration for one frame
///
/// All values are normalized to `[0, 1]`; the engine snapshots them from the
/// parameter atomics once at the top of the frame.
#[derive(Debug, Clone, Copy)]
pub struct ModifierParams {
    /// Frequency window center, log-mapped 20 Hz .. 20 kHz
    pub center_freq: f32,
    /// Frequency window width, 1 .. 60 semitones
    pub bandwidth: f32,
    /// Amplitude EMA amount (0 = identity, 1 = freeze at previous value)
    pub blur: f32,
    /// Amplitude feedback mix
    pub feedback: f32,
    /// Pitch warp, +/- 6 semitones around 0.5
    pub warp: f32,
    /// Fine shift, +/- 100 cents around 0.5
    pub freq: f32,
    /// Octave shift, +/- 2 octaves around 0.5
    pub octave: f32,
}

impl Default for ModifierParams {
    fn default() -> Self {
        Self {
            center_freq: 0.5,
            bandwidth: 1.0,
            blur: 0.0,
            feedback: 0.0,
            warp: 0.5,
            freq: 0.5,
            octave: 0.5,
        }
    }
}

/// The per-partial modifier chain with its persistent sparse state
pub struct ModifierChain {
    /// Blurred amplitude from the previous frame, per track id
    prev_amp: SparseTrackMap,
    /// Feedback amplitude state, per track id
    feedback_amp: SparseTrackMap,
}

impl ModifierChain {
    pub fn new() -> Self {
        let watermark = PRUNE_WATERMARK_FACTOR * MAX_ACTIVE_TRACKS;
        Self {
            prev_amp: SparseTrackMap::with_watermark(watermark, MAX_ACTIVE_TRACKS),
            feedback_amp: SparseTrackMap::with_watermark(watermark, MAX_ACTIVE_TRACKS),
        }
    }

    /// Apply the chain to a frame's working copy of the active tracks
    ///
    /// Tracks falling outside the frequency window are deactivated and
    /// skipped by the rest of the chain; their voices fade out downstream.
    pub fn apply(&mut self, params: &ModifierParams, tracks: &mut [PartialTrack]) {
        let (f_min, f_max) = frequency_window(params.center_freq, params.bandwidth);

        let warp_ratio = 2.0_f32.powf(params.warp - 0.5);
        let cents = (params.freq - 0.5) * 200.0;
        let fine_ratio = 2.0_f32.powf(cents / 1200.0);
        let octave_ratio = 2.0_f32.powf((params.octave - 0.5) * 4.0);

        for track in tracks.iter_mut() {
            if !track.active {
                continue;
            }

            if track.frequency < f_min || track.frequency > f_max {
                track.active = false;
                continue;
            }

            // Blur: EMA against the previous blurred amplitude. alpha is the
            // share of the current frame; blur = 1 freezes at the stored
            // value.
            let alpha = 1.0 - params.blur;
            let prev = self.prev_amp.get(track.track_id).unwrap_or(track.amplitude);
            track.amplitude = (1.0 - alpha) * prev + alpha * track.amplitude;
            self.prev_amp.set(track.track_id, track.amplitude);

            // Feedback: decayed state mixed back in, then refreshed from the
            // post-mix amplitude.
            let fb = self.feedback_amp.get(track.track_id).unwrap_or(0.0) * FEEDBACK_DECAY;
            track.amplitude =
                track.amplitude * (1.0 - params.feedback) + fb * params.feedback;
            self.feedback_amp.set(track.track_id, track.amplitude);

            track.frequency *= warp_ratio * fine_ratio * octave_ratio;
        }

        self.prev_amp.prune(tracks);
        self.feedback_amp.prune(tracks);
    }

    /// Forget all per-track state
    pub fn reset(&mut self) {
        self.prev_amp.clear();
        self.feedback_amp.clear();
    }
}

impl Default for ModifierChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Map the normalized window controls to a [f_min, f_max] band in Hz
///
/// The center sweeps 20 Hz .. 20 kHz logarithmically; the width spans
/// 1 .. 60 semitones centered on it.
fn frequency_window(center_freq: f32, bandwidth: f32) -> (f32, f32) {
    let center_hz = 20.0 * (20_000.0_f32 / 20.0).powf(center_freq);
    let bw_semitones = 1.0 + 59.0 * bandwidth;
    let ratio = 2.0_f32.powf(bw_semitones / 12.0);
    let half = ratio.sqrt();
    (center_hz / half, center_hz * half)
}
