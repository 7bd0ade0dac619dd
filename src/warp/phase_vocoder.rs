//! Phase vocoder time stretching
//!
//! Changes the duration of audio without changing its pitch:
//!
//! 1. Slice the input into overlapping Hann-windowed frames
//! 2. FFT each frame and track per-bin phase advance against the bin's
//!    nominal frequency to recover the true instantaneous frequency
//! 3. Re-accumulate phases at the synthesis hop (analysis hop x ratio)
//! 4. Inverse FFT and overlap-add with window-sum normalization
//!
//! The output length only approximates `input_len x ratio`; callers that need
//! an exact sample count fit the result afterwards.

use crate::error::EngineError;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

const EPSILON: f32 = 1e-10;

/// Analysis hop as a fraction of the FFT size (75% overlap).
const HOP_DIVISOR: usize = 4;

/// Pitch-preserving time stretcher with a fixed FFT configuration.
pub struct PhaseVocoder {
    fft_size: usize,
    hop_analysis: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl PhaseVocoder {
    /// Create a vocoder for the given FFT size.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` unless `fft_size` is a power of
    /// two of at least 64.
    pub fn new(fft_size: usize) -> Result<Self, EngineError> {
        if fft_size < 64 || !fft_size.is_power_of_two() {
            return Err(EngineError::InvalidInput(format!(
                "Vocoder FFT size must be a power of two >= 64, got {}",
                fft_size
            )));
        }

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        // Hann window
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                0.5 * (1.0 - (2.0 * PI * x).cos())
            })
            .collect();

        Ok(Self {
            fft_size,
            hop_analysis: fft_size / HOP_DIVISOR,
            forward,
            inverse,
            window,
        })
    }

    /// Configured FFT size.
    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Stretch `input` by `ratio` (output samples per input sample).
    ///
    /// A ratio of exactly 1.0 copies the input verbatim. Non-positive ratios
    /// and empty input yield an empty output.
    pub fn stretch(&self, input: &[f32], ratio: f64) -> Vec<f32> {
        if input.is_empty() || ratio <= 0.0 {
            return Vec::new();
        }
        if ratio == 1.0 {
            return input.to_vec();
        }

        let fft_size = self.fft_size;
        let hop_a = self.hop_analysis;
        let num_frames = input.len() / hop_a + 1;
        let out_len = (input.len() as f64 * ratio).round() as usize;
        let capacity = out_len + fft_size;

        let mut output = vec![0.0f32; capacity];
        let mut window_sum = vec![0.0f32; capacity];
        let mut last_phase = vec![0.0f32; fft_size];
        let mut phase_acc = vec![0.0f32; fft_size];
        let mut spectrum = vec![Complex::new(0.0f32, 0.0); fft_size];

        let inv_norm = 1.0 / fft_size as f32;
        let two_pi = 2.0 * PI;

        for frame in 0..num_frames {
            let a_pos = frame * hop_a;

            // Windowed frame, zero-padded past the input end
            for i in 0..fft_size {
                let sample = input.get(a_pos + i).copied().unwrap_or(0.0);
                spectrum[i] = Complex::new(sample * self.window[i], 0.0);
            }
            self.forward.process(&mut spectrum);

            for (k, bin) in spectrum.iter_mut().enumerate() {
                let magnitude = bin.norm();
                let phase = bin.arg();

                // Nominal phase advance of bin k over one analysis hop
                let omega = two_pi * k as f32 * hop_a as f32 / fft_size as f32;
                let deviation = wrap_phase(phase - last_phase[k] - omega);
                last_phase[k] = phase;

                if frame == 0 {
                    phase_acc[k] = phase;
                } else {
                    // True frequency scaled to the synthesis hop
                    phase_acc[k] =
                        wrap_phase(phase_acc[k] + (omega + deviation) * ratio as f32);
                }
                *bin = Complex::from_polar(magnitude, phase_acc[k]);
            }

            self.inverse.process(&mut spectrum);

            let s_pos = (frame as f64 * hop_a as f64 * ratio).round() as usize;
            let end = (s_pos + fft_size).min(capacity);
            for i in 0..end.saturating_sub(s_pos) {
                let w = self.window[i];
                output[s_pos + i] += spectrum[i].re * inv_norm * w;
                window_sum[s_pos + i] += w * w;
            }
        }

        for (sample, &w) in output.iter_mut().zip(window_sum.iter()) {
            if w > EPSILON {
                *sample /= w;
            }
        }

        output.truncate(out_len.max(1));
        output
    }
}

/// Wrap a phase to (-pi, pi].
#[inline]
fn wrap_phase(phase: f32) -> f32 {
    let two_pi = 2.0 * PI;
    phase - two_pi * (phase / two_pi).round()
}
