//! Windowed STFT frontend
//!
//! Maintains the circular input FIFO and the dry delay line, schedules an
//! analysis frame every `hop_size` samples, and turns the FIFO contents into
//! a complex spectrum (Hann window + forward real-to-complex FFT).
//!
//! The FIFO discipline follows the classic streaming STFT pattern: samples
//! are written into a ring of length `fft_size`, and on each hop boundary
//! the ring is unwrapped (oldest sample first) into a contiguous buffer for
//! windowing and transformation. No allocation happens after `configure`.

use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use crate::types::{Sample, OVERLAP};

/// Streaming STFT analyzer for one mono channel
///
/// All buffers are sized from `fft_size` and reallocated only in
/// [`StftAnalyzer::configure`]. The per-sample and per-frame paths are
/// allocation-free.
pub struct StftAnalyzer {
    fft_size: usize,
    hop_size: usize,

    /// Circular buffer of the most recent `fft_size` input samples
    input_fifo: Vec<Sample>,
    /// Dry delay line for host wet/dry alignment (same length as the FIFO)
    dry_fifo: Vec<Sample>,
    fifo_pos: usize,
    dry_pos: usize,
    hop_count: usize,
    /// Dry sample evicted from the delay line by the most recent write
    delayed_dry: Sample,

    /// Periodic Hann window (`fft_size + 1` points sampled over `fft_size`)
    window: Vec<f32>,

    fft: Option<Arc<dyn RealToComplex<f32>>>,
    /// Unwrapped + windowed time-domain frame
    fft_input: Vec<f32>,
    /// Complex spectrum, `fft_size / 2 + 1` bins
    spectrum: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
}

impl StftAnalyzer {
    /// Create an unconfigured analyzer; call [`configure`](Self::configure)
    /// before feeding samples.
    pub fn new() -> Self {
        Self {
            fft_size: 0,
            hop_size: 0,
            input_fifo: Vec::new(),
            dry_fifo: Vec::new(),
            fifo_pos: 0,
            dry_pos: 0,
            hop_count: 0,
            delayed_dry: 0.0,
            window: Vec::new(),
            fft: None,
            fft_input: Vec::new(),
            spectrum: Vec::new(),
            fft_scratch: Vec::new(),
        }
    }

    /// (Re)build all FFT-size-dependent state and zero the FIFOs
    ///
    /// Called from `prepare` and from slice-driven reconfiguration, always
    /// under the engine guard - never concurrently with `write_sample`.
    pub fn configure(&mut self, fft_size: usize) {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        self.fft_input = fft.make_input_vec();
        self.spectrum = fft.make_output_vec();
        self.fft_scratch = fft.make_scratch_vec();

        // Periodic Hann: a window of fft_size + 1 points sampled over
        // fft_size, so the implied continuation tiles seamlessly at 75%
        // overlap.
        self.window = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / fft_size as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        self.fft = Some(fft);
        self.fft_size = fft_size;
        self.hop_size = fft_size / OVERLAP;

        self.input_fifo.clear();
        self.input_fifo.resize(fft_size, 0.0);
        self.dry_fifo.clear();
        self.dry_fifo.resize(fft_size, 0.0);

        self.fifo_pos = 0;
        self.dry_pos = 0;
        self.hop_count = 0;
        self.delayed_dry = 0.0;
    }

    /// Drop all FFT resources; the analyzer must be reconfigured before use
    pub fn release(&mut self) {
        self.fft = None;
        self.fft_input = Vec::new();
        self.spectrum = Vec::new();
        self.fft_scratch = Vec::new();
        self.window = Vec::new();
        self.input_fifo = Vec::new();
        self.dry_fifo = Vec::new();
        self.fft_size = 0;
        self.hop_size = 0;
    }

    /// Zero the FIFOs and restart the hop counter, keeping the configuration
    pub fn reset(&mut self) {
        self.input_fifo.fill(0.0);
        self.dry_fifo.fill(0.0);
        self.fifo_pos = 0;
        self.dry_pos = 0;
        self.hop_count = 0;
        self.delayed_dry = 0.0;
    }

    /// Current FFT size in samples (0 when unconfigured)
    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Hop size in samples (fft_size / 4)
    #[inline]
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of spectrum bins (fft_size / 2 + 1)
    #[inline]
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Push one input sample into the FIFOs
    ///
    /// Returns `true` when a hop boundary was crossed and an analysis frame
    /// is due ([`analyze`](Self::analyze) should be called).
    #[inline]
    pub fn write_sample(&mut self, input: Sample) -> bool {
        self.input_fifo[self.fifo_pos] = input;
        self.delayed_dry = self.dry_fifo[self.dry_pos];
        self.dry_fifo[self.dry_pos] = input;

        self.fifo_pos = (self.fifo_pos + 1) % self.fft_size;
        self.dry_pos = (self.dry_pos + 1) % self.fft_size;

        self.hop_count += 1;
        if self.hop_count >= self.hop_size {
            self.hop_count = 0;
            return true;
        }
        false
    }

    /// The dry input sample from `fft_size` samples ago
    ///
    /// Hosts delay the dry path by the reported latency (= `fft_size`) to
    /// align it with the resynthesized output; this accessor reads the
    /// matching sample from the internal delay line.
    #[inline]
    pub fn delayed_dry_sample(&self) -> Sample {
        self.delayed_dry
    }

    /// Unwrap the FIFO, window it, and run the forward FFT
    ///
    /// Returns the complex half-spectrum for the frame ending at the most
    /// recently written sample.
    pub fn analyze(&mut self) -> &[Complex<f32>] {
        let n = self.fft_size;
        let pos = self.fifo_pos;

        // Unwrap the circular FIFO so the oldest sample lands first
        let tail = n - pos;
        self.fft_input[..tail].copy_from_slice(&self.input_fifo[pos..]);
        if pos > 0 {
            self.fft_input[tail..].copy_from_slice(&self.input_fifo[..pos]);
        }

        for (sample, w) in self.fft_input.iter_mut().zip(self.window.iter()) {
            *sample *= w;
        }

        if let Some(fft) = &self.fft {
            // Buffer lengths are fixed by configure, so the transform cannot
            // fail; an error here degrades to an empty frame.
            if fft
                .process_with_scratch(&mut self.fft_input, &mut self.spectrum, &mut self.fft_scratch)
                .is_err()
            {
                self.spectrum.fill(Complex::new(0.0, 0.0));
            }
        }

        &self.spectrum
    }
}

impl Default for StftAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
