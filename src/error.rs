//! Error types for the beat grid engine

use std::fmt;

/// Lowest BPM the engine accepts from external input.
pub const MIN_VALID_BPM: f64 = 0.01;

/// Highest BPM the engine accepts from external input.
pub const MAX_VALID_BPM: f64 = 9999.99;

/// Errors that can occur during analysis or correction.
///
/// Two conditions are deliberately *not* errors:
/// - Inconclusive analysis (no reliable beat grid) is reported as a completed
///   result with confidence 0 and an empty beat list.
/// - User cancellation surfaces as a distinct
///   [`AnalysisOutcome::Cancelled`](crate::analysis::task::AnalysisOutcome) state.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Invalid input parameters (empty buffer, zero sample rate, mismatched
    /// channel lengths, malformed plan, ...)
    InvalidInput(String),

    /// Externally supplied BPM outside the valid range.
    InvalidBpm {
        /// The rejected value.
        bpm: f64,
    },

    /// The corrected buffer could not be allocated. The original buffer and
    /// grid remain valid and untouched.
    OutOfMemory(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            EngineError::InvalidBpm { bpm } => write!(
                f,
                "Invalid BPM {}: must be within [{}, {}]",
                bpm, MIN_VALID_BPM, MAX_VALID_BPM
            ),
            EngineError::OutOfMemory(msg) => write!(f, "Out of memory: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Validate an externally supplied BPM against the accepted range.
///
/// Returns the value unchanged when it lies within
/// [[`MIN_VALID_BPM`], [`MAX_VALID_BPM`]], otherwise `EngineError::InvalidBpm`.
pub fn validate_bpm(bpm: f64) -> Result<f64, EngineError> {
    if !bpm.is_finite() || !(MIN_VALID_BPM..=MAX_VALID_BPM).contains(&bpm) {
        return Err(EngineError::InvalidBpm { bpm });
    }
    Ok(bpm)
}
