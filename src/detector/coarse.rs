//! Coarse tempo estimation
//!
//! Fast, low-resolution BPM estimate from FFT-accelerated autocorrelation of
//! the onset envelope: `ACF = IFFT(|FFT(flux)|^2)`. Peaks in the ACF within
//! the configured BPM range correspond to candidate beat periods.
//!
//! The coarse estimate is provisional: it is reported to the caller before
//! refined analysis completes so the UI can show a value quickly. When no
//! reliable peak exists the estimate is explicitly unavailable (`None`),
//! never zero.

use crate::analysis::result::{TempoEstimate, TempoSource};
use crate::detector::onset::OnsetEnvelope;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const EPSILON: f32 = 1e-10;

/// Minimum normalized ACF peak height to accept a coarse estimate.
const MIN_PEAK_STRENGTH: f32 = 0.1;

/// Estimate a provisional BPM from the onset envelope.
///
/// Returns `None` when the envelope is too short or carries no periodicity
/// strong enough to trust (the explicit "no estimate" state).
pub fn estimate_coarse_bpm(
    envelope: &OnsetEnvelope,
    sample_rate: u32,
    min_bpm: f64,
    max_bpm: f64,
) -> Option<TempoEstimate> {
    let signal = &envelope.flux;
    let hop = envelope.hop_size as f64;

    // Lag bounds in frames for the BPM range
    let min_lag = (60.0 * sample_rate as f64 / (max_bpm * hop)).floor() as usize;
    let max_lag = (60.0 * sample_rate as f64 / (min_bpm * hop)).ceil() as usize;

    if signal.len() < max_lag * 2 || min_lag < 1 {
        log::debug!(
            "Envelope too short for coarse estimate ({} frames, need {})",
            signal.len(),
            max_lag * 2
        );
        return None;
    }

    let acf = autocorrelate(signal);
    let acf0 = acf[0];
    if acf0 <= EPSILON {
        return None;
    }

    // Best interior local maximum within the lag range
    let upper = max_lag.min(acf.len().saturating_sub(1));
    let mut best: Option<(usize, f32)> = None;
    for lag in min_lag.max(1)..upper {
        let value = acf[lag];
        if value > acf[lag - 1] && value >= acf[lag + 1] {
            let normalized = value / acf0;
            if best.map(|(_, v)| normalized > v).unwrap_or(true) {
                best = Some((lag, normalized));
            }
        }
    }

    let (lag, strength) = best?;
    if strength < MIN_PEAK_STRENGTH {
        log::debug!(
            "Coarse ACF peak too weak ({:.3} < {:.3}), no estimate",
            strength,
            MIN_PEAK_STRENGTH
        );
        return None;
    }

    let bpm = 60.0 * sample_rate as f64 / (lag as f64 * hop);
    let confidence = (strength.min(1.0) * 100.0).round() as u8;

    log::debug!(
        "Coarse estimate: {:.2} BPM at lag {} (strength {:.3})",
        bpm,
        lag,
        strength
    );

    TempoEstimate::new(bpm, confidence, TempoSource::Coarse).ok()
}

/// FFT-accelerated autocorrelation: `IFFT(|FFT(signal)|^2)`, real part.
fn autocorrelate(signal: &[f32]) -> Vec<f32> {
    let padded_len = (signal.len() * 2).next_power_of_two();
    let mut buffer: Vec<Complex<f32>> = signal
        .iter()
        .map(|&x| Complex::new(x, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(padded_len)
        .collect();

    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(padded_len);
    let inverse = planner.plan_fft_inverse(padded_len);

    forward.process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    inverse.process(&mut buffer);

    let norm = 1.0 / padded_len as f32;
    buffer
        .iter()
        .take(signal.len())
        .map(|c| c.re * norm)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Envelope with an impulse every `period` frames.
    fn periodic_envelope(period: usize, frames: usize, hop_size: usize) -> OnsetEnvelope {
        let mut flux = vec![0.0f32; frames];
        let mut i = 0;
        while i < frames {
            flux[i] = 1.0;
            i += period;
        }
        OnsetEnvelope {
            energies: vec![0.0; frames + 1],
            flux,
            hop_size,
        }
    }

    #[test]
    fn test_autocorrelation_peak_at_period() {
        let env = periodic_envelope(40, 1000, 512);
        let acf = autocorrelate(&env.flux);
        // ACF at the true period should dominate its neighborhood
        assert!(acf[40] > acf[30]);
        assert!(acf[40] > acf[50]);
    }

    #[test]
    fn test_coarse_estimate_120_bpm() {
        // 120 BPM at 44.1kHz, hop 512: period = 22050 / 512 ~ 43.07 frames
        let env = periodic_envelope(43, 2000, 512);
        let estimate = estimate_coarse_bpm(&env, 44100, 60.0, 180.0)
            .expect("Periodic envelope should yield a coarse estimate");
        assert_eq!(estimate.source, TempoSource::Coarse);
        assert!(
            (estimate.bpm - 120.0).abs() < 5.0,
            "Expected ~120 BPM, got {:.2}",
            estimate.bpm
        );
        assert!(estimate.confidence > 0);
    }

    #[test]
    fn test_coarse_estimate_unavailable_on_flat_envelope() {
        let env = OnsetEnvelope {
            energies: vec![0.0; 2000],
            flux: vec![0.0; 2000],
            hop_size: 512,
        };
        assert!(estimate_coarse_bpm(&env, 44100, 60.0, 180.0).is_none());
    }

    #[test]
    fn test_coarse_estimate_unavailable_on_short_envelope() {
        let env = periodic_envelope(43, 50, 512);
        assert!(estimate_coarse_bpm(&env, 44100, 60.0, 180.0).is_none());
    }
}
