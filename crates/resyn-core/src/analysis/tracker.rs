//! Partial tracking - persistent peak identity across frames
//!
//! McAulay-Quatieri style continuation: each live track predicts where its
//! partial should land in the new frame and greedily claims the closest
//! unclaimed peak within a relative tolerance. Unmatched tracks fade and are
//! retired after a few frames; unclaimed peaks give birth to new tracks.
//!
//! The tracker owns its tracks by value. The engine copies the active set
//! each frame for the modifier chain, so nothing outside this module holds a
//! reference into the tracker.

use super::peaks::SpectralPeak;
use crate::types::{MAX_ACTIVE_TRACKS, MAX_SPECTRAL_PEAKS};

/// Relative frequency deviation a track tolerates when claiming a peak
const MAX_FREQ_DEVIATION_RATIO: f32 = 0.1;

/// Frames a track may go unmatched before it is retired
pub const MAX_FRAMES_DEAD: u32 = 3;

/// Tracks below this amplitude are retired
pub const AMPLITUDE_THRESHOLD: f32 = 1e-3;

/// Single fade step applied to a track on its first unmatched frame
const FADE_FACTOR: f32 = 0.9;

/// Bounded history used by the linear frequency predictor
const MAX_HISTORY: usize = 5;

/// Fixed-capacity value history, oldest first
#[derive(Debug, Clone, Copy, PartialEq)]
struct History {
    values: [f32; MAX_HISTORY],
    len: usize,
}

impl History {
    fn new(first: f32) -> Self {
        let mut values = [0.0; MAX_HISTORY];
        values[0] = first;
        Self { values, len: 1 }
    }

    fn push(&mut self, value: f32) {
        if self.len == MAX_HISTORY {
            self.values.copy_within(1.., 0);
            self.values[MAX_HISTORY - 1] = value;
        } else {
            self.values[self.len] = value;
            self.len += 1;
        }
    }

    fn last(&self) -> f32 {
        self.values[self.len - 1]
    }

    fn previous(&self) -> Option<f32> {
        (self.len >= 2).then(|| self.values[self.len - 2])
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.len
    }
}

/// A tracked spectral partial with a stable identity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialTrack {
    /// Unique for the lifetime of the engine (until reset/reconfigure)
    pub track_id: u64,
    /// Current frequency in Hz
    pub frequency: f32,
    /// Current linear amplitude
    pub amplitude: f32,
    /// Current phase in radians
    pub phase: f32,
    /// Frequency from the previous frame
    pub prev_frequency: f32,
    /// Amplitude from the previous frame
    pub prev_amplitude: f32,
    /// Frames this track has been alive (>= 1)
    pub frames_since_creation: u32,
    /// 0 when matched this frame; increments on unmatched frames
    pub frames_since_last_update: u32,
    /// Cleared only by retirement policy (or downstream modifiers on a copy)
    pub active: bool,

    freq_history: History,
    amp_history: History,
}

impl PartialTrack {
    fn from_peak(track_id: u64, peak: &SpectralPeak) -> Self {
        Self {
            track_id,
            frequency: peak.frequency,
            amplitude: peak.magnitude,
            phase: peak.phase,
            prev_frequency: peak.frequency,
            prev_amplitude: peak.magnitude,
            frames_since_creation: 1,
            frames_since_last_update: 0,
            active: true,
            freq_history: History::new(peak.frequency),
            amp_history: History::new(peak.magnitude),
        }
    }

    fn update_from_peak(&mut self, peak: &SpectralPeak) {
        self.prev_frequency = self.frequency;
        self.prev_amplitude = self.amplitude;

        self.frequency = peak.frequency;
        self.amplitude = peak.magnitude;
        self.phase = peak.phase;

        self.frames_since_last_update = 0;
        self.frames_since_creation += 1;

        self.freq_history.push(peak.frequency);
        self.amp_history.push(peak.magnitude);
    }

    /// Where this partial should land in the next frame
    ///
    /// Linear extrapolation from the last two observed frequencies; with
    /// fewer than two observations the prediction is the current frequency.
    fn predicted_frequency(&self) -> f32 {
        match self.freq_history.previous() {
            Some(prev) => {
                let last = self.freq_history.last();
                last + (last - prev)
            }
            None => self.frequency,
        }
    }
}

/// Frame-to-frame partial continuation engine
pub struct PartialTracker {
    tracks: Vec<PartialTrack>,
    matched: Vec<bool>,
    next_track_id: u64,
}

impl PartialTracker {
    pub fn new() -> Self {
        Self {
            tracks: Vec::with_capacity(MAX_ACTIVE_TRACKS),
            matched: Vec::with_capacity(MAX_SPECTRAL_PEAKS),
            next_track_id: 0,
        }
    }

    /// Advance the tracker by one frame of extracted peaks
    ///
    /// `peaks` arrive sorted by descending magnitude; births preserve that
    /// order so the loudest unclaimed peaks win the remaining track slots.
    pub fn process_frame(&mut self, peaks: &[SpectralPeak]) {
        // Age every track; matching resets the counter for the survivors
        for track in &mut self.tracks {
            track.frames_since_last_update += 1;
        }

        self.match_peaks(peaks);

        // Tracks that just lost their peak take a single fade step
        for track in &mut self.tracks {
            if track.frames_since_last_update == 1 {
                track.prev_amplitude = track.amplitude;
                track.amplitude *= FADE_FACTOR;
            }
        }

        self.tracks.retain(|t| {
            t.active
                && t.frames_since_last_update <= MAX_FRAMES_DEAD
                && t.amplitude >= AMPLITUDE_THRESHOLD
        });

        // Births: loudest unclaimed peaks fill the remaining slots
        for (i, peak) in peaks.iter().enumerate() {
            if self.tracks.len() >= MAX_ACTIVE_TRACKS {
                break;
            }
            if !self.matched[i] {
                self.tracks
                    .push(PartialTrack::from_peak(self.next_track_id, peak));
                self.next_track_id += 1;
            }
        }
    }

    /// Greedy continuation: each track, in list order, claims the closest
    /// unclaimed peak within its tolerance. A peak is claimed at most once;
    /// on equal distance the earlier-scanned track wins.
    fn match_peaks(&mut self, peaks: &[SpectralPeak]) {
        self.matched.clear();
        self.matched.resize(peaks.len(), false);

        for track in &mut self.tracks {
            let predicted = track.predicted_frequency();
            let tolerance = predicted * MAX_FREQ_DEVIATION_RATIO;

            let mut best: Option<usize> = None;
            let mut best_distance = tolerance;

            for (i, peak) in peaks.iter().enumerate() {
                if self.matched[i] {
                    continue;
                }
                let distance = (peak.frequency - predicted).abs();
                if distance < best_distance {
                    best_distance = distance;
                    best = Some(i);
                }
            }

            if let Some(i) = best {
                track.update_from_peak(&peaks[i]);
                self.matched[i] = true;
            }
        }
    }

    /// The live track set, in matching order (newest tracks last)
    #[inline]
    pub fn active_tracks(&self) -> &[PartialTrack] {
        &self.tracks
    }

    /// Drop all tracks and restart the id counter
    ///
    /// Identities are not stable across reset or reconfiguration.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.matched.clear();
        self.next_track_id = 0;
    }
}

impl Default for PartialTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(frequency: f32, magnitude: f32) -> SpectralPeak {
        SpectralPeak {
            frequency,
            magnitude,
            phase: 0.0,
            bin_index: 1,
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let mut h = History::new(1.0);
        for i in 2..=10 {
            h.push(i as f32);
        }
        assert_eq!(h.len(), MAX_HISTORY);
        assert_eq!(h.last(), 10.0);
        assert_eq!(h.previous(), Some(9.0));
        // Oldest surviving value is 10 - 5 + 1 = 6
        assert_eq!(h.values[0], 6.0);
    }

    #[test]
    fn test_birth_creates_active_track() {
        let mut tracker = PartialTracker::new();
        tracker.process_frame(&[peak(440.0, 0.5)]);

        let tracks = tracker.active_tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 0);
        assert_eq!(tracks[0].frames_since_creation, 1);
        assert_eq!(tracks[0].frames_since_last_update, 0);
        assert!(tracks[0].active);
    }

    #[test]
    fn test_match_keeps_identity() {
        let mut tracker = PartialTracker::new();
        tracker.process_frame(&[peak(440.0, 0.5)]);
        tracker.process_frame(&[peak(445.0, 0.6)]);
        tracker.process_frame(&[peak(450.0, 0.7)]);

        let tracks = tracker.active_tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].track_id, 0);
        assert_eq!(tracks[0].frequency, 450.0);
        assert_eq!(tracks[0].prev_frequency, 445.0);
        assert_eq!(tracks[0].frames_since_creation, 3);
    }

    #[test]
    fn test_distant_peak_births_instead_of_matching() {
        let mut tracker = PartialTracker::new();
        tracker.process_frame(&[peak(440.0, 0.5)]);
        // 600 Hz is outside 10% of 440 Hz, so the old track fades and a new
        // one is born
        tracker.process_frame(&[peak(600.0, 0.5)]);

        let tracks = tracker.active_tracks();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].track_id, 0);
        assert_eq!(tracks[0].frames_since_last_update, 1);
        assert!((tracks[0].amplitude - 0.45).abs() < 1e-6);
        assert_eq!(tracks[1].track_id, 1);
        assert_eq!(tracks[1].frequency, 600.0);
    }

    #[test]
    fn test_peak_claimed_once() {
        let mut tracker = PartialTracker::new();
        tracker.process_frame(&[peak(440.0, 0.5), peak(441.0, 0.4)]);
        // Both tracks chase the single surviving peak; only one may claim it
        tracker.process_frame(&[peak(440.5, 0.5)]);

        let matched: Vec<_> = tracker
            .active_tracks()
            .iter()
            .filter(|t| t.frames_since_last_update == 0)
            .collect();
        assert_eq!(matched.len(), 1);
        // Earlier-scanned track wins
        assert_eq!(matched[0].track_id, 0);
    }

    #[test]
    fn test_unmatched_track_retires_after_max_frames_dead() {
        let mut tracker = PartialTracker::new();
        tracker.process_frame(&[peak(440.0, 0.5)]);

        for _ in 0..MAX_FRAMES_DEAD {
            tracker.process_frame(&[]);
            assert_eq!(tracker.active_tracks().len(), 1);
        }
        // frames_since_last_update now exceeds MAX_FRAMES_DEAD
        tracker.process_frame(&[]);
        assert!(tracker.active_tracks().is_empty());
    }

    #[test]
    fn test_quiet_track_retires_on_amplitude() {
        let mut tracker = PartialTracker::new();
        tracker.process_frame(&[peak(440.0, 1.05e-3)]);
        // One fade step (x0.9) drops it below the amplitude threshold
        tracker.process_frame(&[]);
        assert!(tracker.active_tracks().is_empty());
    }

    #[test]
    fn test_track_count_is_capped() {
        let mut tracker = PartialTracker::new();
        let peaks: Vec<SpectralPeak> = (0..MAX_SPECTRAL_PEAKS + 10)
            .map(|i| peak(100.0 * (i + 1) as f32 * 3.0, 1.0))
            .collect();
        tracker.process_frame(&peaks);

        assert_eq!(tracker.active_tracks().len(), MAX_ACTIVE_TRACKS);
    }

    #[test]
    fn test_prediction_follows_linear_drift() {
        let mut tracker = PartialTracker::new();
        // Steady upward drift of 30 Hz per frame
        for step in 0..5 {
            tracker.process_frame(&[peak(1000.0 + step as f32 * 30.0, 0.5)]);
        }
        let track = tracker.active_tracks()[0];
        assert_eq!(track.track_id, 0);
        // Prediction extrapolates the drift
        assert!((track.predicted_frequency() - 1150.0).abs() < 1e-3);
    }

    #[test]
    fn test_sub_threshold_birth_retires_next_frame() {
        let mut tracker = PartialTracker::new();
        // Births take any unmatched peak, however quiet
        tracker.process_frame(&[peak(440.0, 0.5), peak(880.0, 1e-6)]);
        assert_eq!(tracker.active_tracks().len(), 2);

        // One frame later the quiet track fails the amplitude check
        tracker.process_frame(&[peak(440.0, 0.5)]);
        let tracks = tracker.active_tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].frequency, 440.0);
    }

    #[test]
    fn test_reset_restarts_ids() {
        let mut tracker = PartialTracker::new();
        tracker.process_frame(&[peak(440.0, 0.5)]);
        tracker.reset();
        assert!(tracker.active_tracks().is_empty());

        tracker.process_frame(&[peak(880.0, 0.5)]);
        assert_eq!(tracker.active_tracks()[0].track_id, 0);
    }
}
