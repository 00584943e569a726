//! Spectral peak extraction with parabolic sub-bin interpolation
//!
//! Scans the magnitude spectrum for interior local maxima, refines each
//! maximum with a three-point parabolic fit for sub-bin frequency accuracy,
//! and keeps the strongest `MAX_SPECTRAL_PEAKS` candidates.

use realfft::num_complex::Complex;

use crate::types::MAX_SPECTRAL_PEAKS;

/// Denominators smaller than this are treated as a degenerate parabola and
/// the peak stays at the integer bin.
const INTERP_EPSILON: f32 = 1e-10;

/// One local maximum in a magnitude spectrum
///
/// Valid only within the frame it was extracted from; the tracker copies
/// what it needs and peaks are never retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    /// Interpolated frequency in Hz
    pub frequency: f32,
    /// Interpolated linear magnitude (normalized by FFT size)
    pub magnitude: f32,
    /// Phase in radians at the integer bin (not interpolated)
    pub phase: f32,
    /// FFT bin where the raw maximum sits
    pub bin_index: usize,
}

/// Reusable peak extractor
///
/// All scratch buffers are reserved in [`configure`](Self::configure);
/// extraction itself does not allocate.
pub struct PeakExtractor {
    magnitudes: Vec<f32>,
    peaks: Vec<SpectralPeak>,
}

impl PeakExtractor {
    pub fn new() -> Self {
        Self {
            magnitudes: Vec::new(),
            peaks: Vec::new(),
        }
    }

    /// Reserve scratch storage for a spectrum of `num_bins` bins
    pub fn configure(&mut self, num_bins: usize) {
        self.magnitudes.clear();
        self.magnitudes.reserve(num_bins);
        self.peaks.clear();
        // Interior local maxima rarely exceed a quarter of the bins
        self.peaks.reserve((num_bins / 4).max(MAX_SPECTRAL_PEAKS));
    }

    /// Extract the dominant peaks from one frame's complex spectrum
    ///
    /// Returns at most [`MAX_SPECTRAL_PEAKS`] peaks sorted by descending
    /// magnitude, ties broken by ascending bin index so the ordering is
    /// deterministic for identical input.
    pub fn extract(
        &mut self,
        spectrum: &[Complex<f32>],
        sample_rate: f32,
        fft_size: usize,
    ) -> &[SpectralPeak] {
        let num_bins = spectrum.len();
        let scale = 1.0 / fft_size as f32;

        self.magnitudes.clear();
        self.magnitudes
            .extend(spectrum.iter().map(|c| c.norm() * scale));

        self.peaks.clear();

        for i in 1..num_bins.saturating_sub(1) {
            let y0 = self.magnitudes[i];
            let y_minus = self.magnitudes[i - 1];
            let y_plus = self.magnitudes[i + 1];

            if y0 <= y_minus || y0 <= y_plus {
                continue;
            }

            // Parabolic refinement around the maximum. A flat three-point
            // neighborhood degenerates to the integer bin.
            let denominator = 2.0 * (2.0 * y0 - y_plus - y_minus);
            let delta = if denominator.abs() > INTERP_EPSILON {
                ((y_minus - y_plus) / denominator).clamp(-0.5, 0.5)
            } else {
                0.0
            };

            let frequency = (i as f32 + delta) * sample_rate / fft_size as f32;
            let magnitude = y0 - 0.25 * (y_minus - y_plus) * delta;
            let phase = spectrum[i].arg();

            self.peaks.push(SpectralPeak {
                frequency,
                magnitude,
                phase,
                bin_index: i,
            });
        }

        self.peaks.sort_unstable_by(|a, b| {
            b.magnitude
                .partial_cmp(&a.magnitude)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.bin_index.cmp(&b.bin_index))
        });
        self.peaks.truncate(MAX_SPECTRAL_PEAKS);

        &self.peaks
    }
}

impl Default for PeakExtractor {
    fn default() -> Self {
        Self::new()
    }
}
