//! Onset envelope extraction
//!
//! Builds a frame-by-frame RMS energy envelope and its rectified derivative
//! (energy flux), then peak-picks the flux to locate onset candidates.
//!
//! Algorithm:
//! 1. Divide audio into overlapping frames (frame_size, hop_size)
//! 2. Compute RMS energy per frame
//! 3. Compute energy derivative: flux[n] = max(0, E[n] - E[n-1])
//! 4. Threshold (dB relative to max flux) and pick local maxima

use crate::error::EngineError;
use std::sync::atomic::{AtomicBool, Ordering};

/// Numerical stability epsilon
const EPSILON: f32 = 1e-10;

/// How many frames to process between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Frame-based onset envelope of a mono signal.
#[derive(Debug, Clone)]
pub struct OnsetEnvelope {
    /// RMS energy per frame.
    pub energies: Vec<f32>,
    /// Rectified energy derivative; `flux[n]` compares frames `n+1` and `n`.
    pub flux: Vec<f32>,
    /// Hop size the frames were computed with.
    pub hop_size: usize,
}

impl OnsetEnvelope {
    /// Convert a flux index to the sample position of the frame it describes.
    #[inline]
    pub fn flux_index_to_sample(&self, index: usize) -> usize {
        (index + 1) * self.hop_size
    }
}

/// Compute the onset envelope of a mono signal.
///
/// Returns `Ok(None)` if `cancel` was raised mid-computation; the partial
/// envelope is discarded.
///
/// # Errors
///
/// Returns `EngineError::InvalidInput` for zero frame or hop size.
pub fn compute_envelope(
    samples: &[f32],
    frame_size: usize,
    hop_size: usize,
    cancel: &AtomicBool,
) -> Result<Option<OnsetEnvelope>, EngineError> {
    if frame_size == 0 {
        return Err(EngineError::InvalidInput(
            "Frame size must be > 0".to_string(),
        ));
    }
    if hop_size == 0 {
        return Err(EngineError::InvalidInput(
            "Hop size must be > 0".to_string(),
        ));
    }

    if samples.len() < frame_size {
        log::warn!(
            "Frame size ({}) larger than audio length ({}), envelope is empty",
            frame_size,
            samples.len()
        );
        return Ok(Some(OnsetEnvelope {
            energies: Vec::new(),
            flux: Vec::new(),
            hop_size,
        }));
    }

    let num_frames = (samples.len() - frame_size) / hop_size + 1;
    let mut energies = Vec::with_capacity(num_frames);

    for i in 0..num_frames {
        if i % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            log::debug!("Envelope computation cancelled at frame {}/{}", i, num_frames);
            return Ok(None);
        }
        let start = i * hop_size;
        let end = (start + frame_size).min(samples.len());
        let sum_sq: f32 = samples[start..end].iter().map(|&x| x * x).sum();
        energies.push((sum_sq / (end - start) as f32).sqrt());
    }

    let flux = energies
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect();

    Ok(Some(OnsetEnvelope {
        energies,
        flux,
        hop_size,
    }))
}

/// Peak-pick the flux envelope into onset sample positions.
///
/// `threshold_db` is relative to the maximum flux value (typically -20 to
/// -30 dB). Peaks closer than half a hop are deduplicated, keeping the
/// earlier one.
pub fn pick_onsets(envelope: &OnsetEnvelope, threshold_db: f32, samples_len: usize) -> Vec<usize> {
    let flux = &envelope.flux;
    if flux.len() < 2 {
        return Vec::new();
    }

    let max_flux = flux.iter().copied().fold(0.0f32, f32::max);
    if max_flux <= EPSILON {
        log::debug!("Flux envelope is flat, no onsets detected");
        return Vec::new();
    }
    let threshold = max_flux * 10.0_f32.powf(threshold_db / 20.0);

    let mut onsets = Vec::new();

    // Interior local maxima; >= on the right handles plateaus.
    for i in 1..flux.len() - 1 {
        if flux[i] > threshold && flux[i] > flux[i - 1] && flux[i] >= flux[i + 1] {
            let pos = envelope.flux_index_to_sample(i);
            if pos < samples_len {
                onsets.push(pos);
            }
        }
    }

    // Boundary frames.
    if flux[0] > threshold && flux[0] >= flux[1] {
        let pos = envelope.flux_index_to_sample(0);
        if pos < samples_len {
            onsets.push(pos);
        }
    }
    let last = flux.len() - 1;
    if flux[last] > threshold && flux[last] > flux[last - 1] {
        let pos = envelope.flux_index_to_sample(last);
        if pos < samples_len {
            onsets.push(pos);
        }
    }

    onsets.sort_unstable();

    // Deduplicate detections of the same onset across overlapping frames.
    let mut deduplicated: Vec<usize> = Vec::with_capacity(onsets.len());
    for onset in onsets {
        match deduplicated.last() {
            Some(&prev) if onset < prev + envelope.hop_size / 2 => {}
            _ => deduplicated.push(onset),
        }
    }

    log::debug!("Picked {} onsets (threshold {:.1} dB)", deduplicated.len(), threshold_db);
    deduplicated
}

/// RMS energy of a window centered at `position`.
///
/// Used by beat placement to rank candidate positions.
pub fn local_energy(samples: &[f32], position: usize, window_size: usize) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let half = window_size / 2;
    let start = position.saturating_sub(half);
    let end = (position + half).min(samples.len());
    if start >= end {
        return 0.0;
    }
    let sum_sq: f32 = samples[start..end].iter().map(|&x| x * x).sum();
    (sum_sq / (end - start) as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsignal::kick_pattern;

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_envelope_empty_input() {
        let env = compute_envelope(&[], 2048, 512, &no_cancel())
            .unwrap()
            .unwrap();
        assert!(env.energies.is_empty());
        assert!(env.flux.is_empty());
    }

    #[test]
    fn test_envelope_invalid_parameters() {
        let samples = vec![0.5f32; 4096];
        assert!(compute_envelope(&samples, 0, 512, &no_cancel()).is_err());
        assert!(compute_envelope(&samples, 2048, 0, &no_cancel()).is_err());
    }

    #[test]
    fn test_envelope_cancelled() {
        let samples = vec![0.5f32; 44100];
        let cancel = AtomicBool::new(true);
        let result = compute_envelope(&samples, 2048, 512, &cancel).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_onsets_on_step_function() {
        // Silence, then a sudden constant signal: one clear energy rise
        let mut samples = vec![0.0f32; 44100];
        for s in samples.iter_mut().skip(5000) {
            *s = 0.5;
        }
        let env = compute_envelope(&samples, 2048, 512, &no_cancel())
            .unwrap()
            .unwrap();
        let onsets = pick_onsets(&env, -30.0, samples.len());
        assert!(!onsets.is_empty(), "Step function should yield an onset");
        assert!(
            onsets[0] >= 3000 && onsets[0] <= 8000,
            "Onset should be near the step at 5000, got {}",
            onsets[0]
        );
    }

    #[test]
    fn test_onsets_on_silence() {
        let samples = vec![0.0f32; 44100];
        let env = compute_envelope(&samples, 2048, 512, &no_cancel())
            .unwrap()
            .unwrap();
        assert!(pick_onsets(&env, -20.0, samples.len()).is_empty());
    }

    #[test]
    fn test_onsets_kick_pattern_roughly_periodic() {
        let samples = kick_pattern(4.0, 120.0, 44100);
        let env = compute_envelope(&samples, 2048, 512, &no_cancel())
            .unwrap()
            .unwrap();
        let onsets = pick_onsets(&env, -30.0, samples.len());

        // 120 BPM over 4 seconds = 8 beats; allow misses at boundaries
        assert!(
            onsets.len() >= 4 && onsets.len() <= 12,
            "Expected 4-12 onsets, got {}",
            onsets.len()
        );

        let expected = (60.0 / 120.0 * 44100.0) as usize;
        let intervals: Vec<usize> = onsets.windows(2).map(|w| w[1] - w[0]).collect();
        let avg = intervals.iter().sum::<usize>() / intervals.len().max(1);
        assert!(
            (avg as i64 - expected as i64).unsigned_abs() < (expected / 2) as u64,
            "Average onset interval {} too far from {}",
            avg,
            expected
        );
    }

    #[test]
    fn test_local_energy_window_clamped_at_edges() {
        let samples = vec![1.0f32; 100];
        assert!((local_energy(&samples, 0, 50) - 1.0).abs() < 1e-6);
        assert!((local_energy(&samples, 99, 50) - 1.0).abs() < 1e-6);
        assert_eq!(local_energy(&[], 10, 50), 0.0);
    }
}
