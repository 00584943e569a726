//! Sparse `track_id -> f32` state storage for per-partial modifiers
//!
//! Blur and feedback need a small amount of state keyed by track identity
//! that survives the tracks themselves being copied and modified each frame.
//! A flat key/value vector with linear lookup covers this: live ids number
//! at most a few dozen, and nothing allocates after `with_capacity`.

use crate::analysis::PartialTrack;

/// Flat association from track id to a single f32 of modifier state
///
/// Entries for retired tracks linger harmlessly until [`prune`](Self::prune)
/// drops everything not present in the live set.
pub struct SparseTrackMap {
    entries: Vec<(u64, f32)>,
    watermark: usize,
}

impl SparseTrackMap {
    /// `watermark` is the entry count above which [`prune`](Self::prune)
    /// actually sweeps; capacity is reserved so inserts between sweeps never
    /// allocate.
    pub fn with_watermark(watermark: usize, max_inserts_per_frame: usize) -> Self {
        Self {
            entries: Vec::with_capacity(watermark + max_inserts_per_frame),
            watermark,
        }
    }

    /// Look up the state for a track id
    #[inline]
    pub fn get(&self, track_id: u64) -> Option<f32> {
        self.entries
            .iter()
            .find(|(id, _)| *id == track_id)
            .map(|(_, v)| *v)
    }

    /// Insert or overwrite the state for a track id
    pub fn set(&mut self, track_id: u64, value: f32) {
        if let Some(entry) = self.entries.iter_mut().find(|(id, _)| *id == track_id) {
            entry.1 = value;
        } else {
            self.entries.push((track_id, value));
        }
    }

    /// Drop entries whose ids are not in `live` once the watermark is hit
    pub fn prune(&mut self, live: &[PartialTrack]) {
        if self.entries.len() <= self.watermark {
            return;
        }
        self.entries
            .retain(|(id, _)| live.iter().any(|t| t.track_id == *id));
    }

    /// Remove all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
