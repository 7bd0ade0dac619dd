//! Correction planning
//!
//! Turns a detected grid and its idealized counterpart into an ordered list
//! of time-warp segments. Planning is pure: it never touches audio, so a plan
//! can be inspected, serialized, or discarded without cost.
//!
//! Segment layout follows the beat markers: audio before the first beat and
//! after the last beat passes through unchanged, and each inter-beat span is
//! stretched so its end lands on the ideal position of the next beat.

use crate::analysis::result::BeatGrid;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Ratio window around 1.0 inside which a segment is treated as identity and
/// copied rather than stretched.
pub const UNITY_EPSILON: f64 = 1e-3;

/// One contiguous span of source audio and the span it must occupy in the
/// corrected output. Half-open ranges in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub source_start: usize,
    pub source_end: usize,
    pub target_start: usize,
    pub target_end: usize,
}

impl Segment {
    #[inline]
    pub fn source_len(&self) -> usize {
        self.source_end - self.source_start
    }

    #[inline]
    pub fn target_len(&self) -> usize {
        self.target_end - self.target_start
    }

    /// Stretch ratio: output samples per input sample.
    #[inline]
    pub fn ratio(&self) -> f64 {
        self.target_len() as f64 / self.source_len() as f64
    }

    /// True when the segment keeps its length and may be copied verbatim.
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.source_len() == self.target_len() || (self.ratio() - 1.0).abs() < UNITY_EPSILON
    }
}

/// Ordered, contiguous time-warp plan for one buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionPlan {
    segments: Vec<Segment>,
    source_len: usize,
}

impl CorrectionPlan {
    /// Segments in output order. Contiguous in both domains: each segment's
    /// start equals the previous segment's end.
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Length of the source buffer the plan was built for.
    #[inline]
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// Total length of the corrected output. The warp stage must produce
    /// exactly this many samples per channel.
    pub fn target_len(&self) -> usize {
        self.segments.last().map(|s| s.target_end).unwrap_or(0)
    }

    /// True when every segment is an exact-length pass-through, i.e. the
    /// warp would reproduce the input bit for bit.
    pub fn is_noop(&self) -> bool {
        self.segments
            .iter()
            .all(|s| s.source_len() == s.target_len() && s.source_start == s.target_start)
    }
}

/// Build a correction plan mapping `detected` beats onto `ideal` positions.
///
/// `len_samples` is the source buffer length; spans outside the beat range
/// (head before the first beat, tail after the last) map 1:1.
///
/// # Errors
///
/// Returns `EngineError::InvalidInput` when the grids disagree in length or
/// sample rate, or when beats fall outside the buffer.
pub fn plan(
    detected: &BeatGrid,
    ideal: &BeatGrid,
    len_samples: usize,
) -> Result<CorrectionPlan, EngineError> {
    if detected.sample_rate() != ideal.sample_rate() {
        return Err(EngineError::InvalidInput(format!(
            "Grid sample rates disagree: {} vs {}",
            detected.sample_rate(),
            ideal.sample_rate()
        )));
    }
    if detected.len() != ideal.len() {
        return Err(EngineError::InvalidInput(format!(
            "Grids must pair beat for beat: {} vs {}",
            detected.len(),
            ideal.len()
        )));
    }
    if let Some(last) = detected.beats().last() {
        if last.position >= len_samples {
            return Err(EngineError::InvalidInput(format!(
                "Beat at {} outside buffer of {} samples",
                last.position, len_samples
            )));
        }
    }

    // Fewer than two beats: nothing to regularize, the whole buffer passes
    // through unchanged.
    if detected.len() < 2 {
        let segments = if len_samples > 0 {
            vec![Segment {
                source_start: 0,
                source_end: len_samples,
                target_start: 0,
                target_end: len_samples,
            }]
        } else {
            Vec::new()
        };
        return Ok(CorrectionPlan {
            segments,
            source_len: len_samples,
        });
    }

    let detected_beats = detected.beats();
    let ideal_beats = ideal.beats();
    let mut segments = Vec::with_capacity(detected.len() + 1);
    let mut target_cursor = 0usize;

    // Head: everything before the first beat, untouched.
    let first = detected_beats[0].position;
    if first > 0 {
        segments.push(Segment {
            source_start: 0,
            source_end: first,
            target_start: 0,
            target_end: first,
        });
        target_cursor = first;
    }

    for k in 0..detected_beats.len() - 1 {
        let source_start = detected_beats[k].position;
        let source_end = detected_beats[k + 1].position;
        let mut target_len = ideal_beats[k + 1]
            .position
            .saturating_sub(ideal_beats[k].position);
        if target_len == 0 {
            // Ideal positions collapsed (extreme tempo vs rate); keep the
            // span as-is rather than dropping audio.
            log::warn!(
                "Degenerate target span at beat {}, passing source through 1:1",
                k
            );
            target_len = source_end - source_start;
        }
        segments.push(Segment {
            source_start,
            source_end,
            target_start: target_cursor,
            target_end: target_cursor + target_len,
        });
        target_cursor += target_len;
    }

    // Tail: everything from the last beat on, untouched.
    let last = detected_beats[detected_beats.len() - 1].position;
    if last < len_samples {
        segments.push(Segment {
            source_start: last,
            source_end: len_samples,
            target_start: target_cursor,
            target_end: target_cursor + (len_samples - last),
        });
    }

    let plan = CorrectionPlan {
        segments,
        source_len: len_samples,
    };
    log::debug!(
        "Planned {} segments: {} -> {} samples ({} stretched)",
        plan.segments.len(),
        len_samples,
        plan.target_len(),
        plan.segments.iter().filter(|s| !s.is_identity()).count()
    );
    Ok(plan)
}
