//! Plan execution
//!
//! Renders a [`CorrectionPlan`] against a PCM buffer. Channels render in
//! parallel; within a channel, segments render in output order:
//!
//! - Exact-length segments are copied verbatim, so a no-op plan reproduces
//!   the input bit for bit.
//! - Near-unity segments are fitted with cubic resampling alone.
//! - Everything else goes through the phase vocoder, then cubic fitting to
//!   the exact planned length.
//!
//! Joins between segments are crossfaded over a short window against the
//! previous segment's continuation to avoid clicks at stretch boundaries.

pub mod phase_vocoder;
pub mod resample;

use crate::buffer::PcmBuffer;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::planner::{CorrectionPlan, Segment};
use phase_vocoder::PhaseVocoder;
use rayon::prelude::*;
use resample::stretch_cubic;

/// Apply a correction plan to a buffer, producing the corrected audio.
///
/// The output has exactly [`CorrectionPlan::target_len`] samples per channel.
/// The input buffer is untouched; callers keep it for undo.
///
/// # Errors
///
/// Returns `EngineError::InvalidInput` when the plan was built for a
/// different buffer length, and `EngineError::OutOfMemory` when the output
/// allocation fails.
pub fn apply_plan(
    buffer: &PcmBuffer,
    plan: &CorrectionPlan,
    config: &EngineConfig,
) -> Result<PcmBuffer, EngineError> {
    if plan.source_len() != buffer.len_samples() {
        return Err(EngineError::InvalidInput(format!(
            "Plan was built for {} samples, buffer has {}",
            plan.source_len(),
            buffer.len_samples()
        )));
    }

    log::debug!(
        "Applying plan: {} segments, {} channels, {} -> {} samples",
        plan.segments().len(),
        buffer.channel_count(),
        plan.source_len(),
        plan.target_len()
    );

    let vocoder = PhaseVocoder::new(config.vocoder_fft_size)?;
    let crossfade = (config.crossfade_ms / 1000.0 * buffer.sample_rate() as f64) as usize;

    let channels: Result<Vec<Vec<f32>>, EngineError> = buffer
        .channels()
        .par_iter()
        .map(|channel| render_channel(channel, plan, crossfade, &vocoder))
        .collect();

    PcmBuffer::new(channels?, buffer.sample_rate())
}

/// Render one channel of the plan.
fn render_channel(
    samples: &[f32],
    plan: &CorrectionPlan,
    crossfade: usize,
    vocoder: &PhaseVocoder,
) -> Result<Vec<f32>, EngineError> {
    let target_len = plan.target_len();
    let mut output: Vec<f32> = Vec::new();
    output.try_reserve_exact(target_len).map_err(|_| {
        EngineError::OutOfMemory(format!("corrected channel of {} samples", target_len))
    })?;
    output.resize(target_len, 0.0);

    // Tail of the previous segment rendered past its boundary, used to
    // crossfade into the next segment.
    let mut continuation: Vec<f32> = Vec::new();

    let segments = plan.segments();
    for (index, segment) in segments.iter().enumerate() {
        let is_last = index + 1 == segments.len();
        let extra = if is_last { 0 } else { crossfade };
        let rendered = render_segment(samples, segment, extra, vocoder);

        for i in 0..segment.target_len() {
            let new = rendered.get(i).copied().unwrap_or(0.0);
            let value = if i < continuation.len() && crossfade > 0 {
                // Linear ramp from the previous segment's continuation into
                // this segment. Identical material cancels exactly, so
                // unchanged audio stays bit-exact.
                let weight = (i + 1) as f32 / (crossfade + 1) as f32;
                let old = continuation[i];
                old + (new - old) * weight
            } else {
                new
            };
            output[segment.target_start + i] = value;
        }

        continuation.clear();
        if rendered.len() > segment.target_len() {
            continuation.extend_from_slice(&rendered[segment.target_len()..]);
        }
    }

    Ok(output)
}

/// Render a segment to `target_len + continuation` samples, where the
/// continuation extends past the segment boundary for crossfading (clamped
/// at the end of the channel).
fn render_segment(
    samples: &[f32],
    segment: &Segment,
    extra: usize,
    vocoder: &PhaseVocoder,
) -> Vec<f32> {
    // Exact-length pass-through: copy, including the continuation.
    if segment.source_len() == segment.target_len() {
        let end = (segment.source_end + extra).min(samples.len());
        return samples[segment.source_start..end].to_vec();
    }

    let ratio = segment.ratio();

    // Near-unity: cubic fit alone; the pitch error at this ratio is below
    // audibility and the vocoder would only smear transients.
    if segment.is_identity() {
        let end = (segment.source_end + extra).min(samples.len());
        let continuation = end - segment.source_end;
        return stretch_cubic(
            &samples[segment.source_start..end],
            segment.target_len() + continuation,
        );
    }

    let source_extra = (extra as f64 / ratio).round() as usize;
    let end = (segment.source_end + source_extra).min(samples.len());
    let continuation = ((end - segment.source_end) as f64 * ratio).round() as usize;
    let source = &samples[segment.source_start..end];
    let target_total = segment.target_len() + continuation;

    // Segments shorter than one analysis frame carry no spectral material
    // worth vocoding; interpolate them directly.
    if source.len() < vocoder.fft_size() {
        return stretch_cubic(source, target_total);
    }

    // Pitch-preserving stretch, then pin the planned length exactly.
    let stretched = vocoder.stretch(source, ratio);
    stretch_cubic(&stretched, target_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::result::{BeatGrid, TempoEstimate, TempoSource};
    use crate::planner;
    use crate::testsignal::kick_pattern;

    const SR: u32 = 44100;

    fn grid(positions: Vec<usize>) -> BeatGrid {
        let tempo = TempoEstimate::new(120.0, 90, TempoSource::Refined).unwrap();
        BeatGrid::new(positions, tempo, SR).unwrap()
    }

    #[test]
    fn test_noop_plan_is_bit_exact() {
        let samples = kick_pattern(2.0, 120.0, SR);
        let buffer = PcmBuffer::new(vec![samples.clone()], SR).unwrap();
        let detected = grid(vec![0, 22050, 44100, 66150]);
        let plan = planner::plan(&detected, &detected.ideal(), samples.len()).unwrap();
        assert!(plan.is_noop());

        let out = apply_plan(&buffer, &plan, &EngineConfig::default()).unwrap();
        assert_eq!(out.channel(0), buffer.channel(0));
    }

    #[test]
    fn test_output_matches_planned_length() {
        let samples = kick_pattern(2.0, 120.0, SR);
        // Second beat drifted late: stretching changes span lengths but the
        // plan total is authoritative
        let detected = grid(vec![0, 24000, 44100, 66150]);
        let plan = planner::plan(&detected, &detected.ideal(), samples.len()).unwrap();
        assert!(!plan.is_noop());

        let buffer = PcmBuffer::new(vec![samples], SR).unwrap();
        let out = apply_plan(&buffer, &plan, &EngineConfig::default()).unwrap();
        assert_eq!(out.len_samples(), plan.target_len());
    }

    #[test]
    fn test_stereo_channels_rendered_consistently() {
        let left = kick_pattern(2.0, 120.0, SR);
        let right = left.clone();
        let buffer = PcmBuffer::new(vec![left, right], SR).unwrap();
        let detected = grid(vec![0, 24000, 44100, 66150]);
        let plan = planner::plan(&detected, &detected.ideal(), buffer.len_samples()).unwrap();

        let out = apply_plan(&buffer, &plan, &EngineConfig::default()).unwrap();
        assert_eq!(out.channel_count(), 2);
        // Identical input channels must render identically
        assert_eq!(out.channel(0), out.channel(1));
    }

    #[test]
    fn test_rejects_mismatched_plan() {
        let samples = kick_pattern(1.0, 120.0, SR);
        let detected = grid(vec![0, 22050]);
        let plan = planner::plan(&detected, &detected.ideal(), samples.len()).unwrap();

        let other = PcmBuffer::new(vec![vec![0.0; 1000]], SR).unwrap();
        assert!(apply_plan(&other, &plan, &EngineConfig::default()).is_err());
    }

    #[test]
    fn test_render_segment_identity_with_continuation() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.1).sin()).collect();
        let segment = Segment {
            source_start: 100,
            source_end: 500,
            target_start: 100,
            target_end: 500,
        };
        let vocoder = PhaseVocoder::new(2048).unwrap();
        let rendered = render_segment(&samples, &segment, 50, &vocoder);
        assert_eq!(rendered.len(), 450);
        assert_eq!(&rendered[..400], &samples[100..500]);
        assert_eq!(&rendered[400..], &samples[500..550]);
    }
}
