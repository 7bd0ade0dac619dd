//! # beatgrid-dsp
//!
//! Beat grid analysis and correction for decoded PCM audio.
//!
//! The engine answers four questions about a track:
//!
//! - **What tempo is it?** A fast coarse pass gives a provisional BPM, then
//!   a refined pass fits inter-onset statistics for a final estimate with a
//!   0-100 confidence score.
//! - **Where are the beats?** Detected positions form a [`BeatGrid`],
//!   sample-accurate and strictly ordered.
//! - **How regular are they?** [`evaluate`] measures each beat's deviation
//!   from an idealized constant-tempo grid as a percentage of the beat
//!   period and flags beats beyond a tolerance.
//! - **Can they be fixed?** [`plan`] maps detected beats onto their ideal
//!   positions and [`apply_plan`] renders the pitch-preserving time warp.
//!   Corrections are reversible via [`CorrectionCommand`].
//!
//! Analysis can run on a background thread through
//! [`spawn_analysis`](analysis::task::spawn_analysis) and is cancellable at
//! any point without leaving partial results behind.
//!
//! ## Example
//!
//! ```no_run
//! use beatgrid_dsp::{analyze, correct, evaluate, EngineConfig, PcmBuffer, Verdict};
//!
//! # fn main() -> Result<(), beatgrid_dsp::EngineError> {
//! let samples: Vec<f32> = vec![0.0; 44100 * 4];
//! let buffer = PcmBuffer::mono(samples, 44100)?;
//! let config = EngineConfig::default();
//!
//! let report = analyze(&buffer, &config)?;
//! let deviation = evaluate(&report.grid, config.tolerance_pct);
//! if deviation.verdict == Verdict::CorrectionRecommended {
//!     let command = correct(&buffer, &report.grid, &config)?;
//!     // command.after() holds the corrected track; revert() undoes it
//!     let _ = command.after();
//! }
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod buffer;
pub mod command;
pub mod config;
pub mod detector;
pub mod deviation;
pub mod error;
pub mod planner;
pub mod warp;

#[cfg(test)]
mod testsignal;

pub use analysis::result::{AnalysisReport, Beat, BeatGrid, TempoEstimate, TempoSource};
pub use analysis::task::{spawn_analysis, AnalysisHandle, AnalysisOutcome, Progress};
pub use buffer::PcmBuffer;
pub use command::{CorrectionCommand, TrackState};
pub use config::{EngineConfig, TimeSignature};
pub use deviation::{evaluate, BeatDeviation, DeviationReport, Verdict};
pub use error::EngineError;
pub use planner::{plan, CorrectionPlan, Segment};
pub use warp::apply_plan;

use std::sync::atomic::AtomicBool;

/// Analyze a buffer synchronously: coarse estimate, refined estimate, and
/// detected beat grid.
///
/// Inconclusive analysis is a successful report with an empty grid and zero
/// confidence, not an error. For responsive callers, prefer
/// [`spawn_analysis`] which runs the same pipeline off-thread and streams
/// the coarse estimate early.
///
/// # Errors
///
/// Returns `EngineError::OutOfMemory` if the mono mixdown cannot be
/// allocated, or `EngineError::InvalidInput` for degenerate configuration.
pub fn analyze(buffer: &PcmBuffer, config: &EngineConfig) -> Result<AnalysisReport, EngineError> {
    let mono = buffer.mix_to_mono()?;
    let cancel = AtomicBool::new(false);
    match detector::detect(&mono, buffer.sample_rate(), config, &cancel, &mut |_| {})? {
        Some(report) => Ok(report),
        // Unreachable without a raised cancel flag; keep the inconclusive
        // shape rather than panicking.
        None => Ok(AnalysisReport {
            coarse: None,
            refined: None,
            grid: BeatGrid::inconclusive(buffer.sample_rate()),
        }),
    }
}

/// Build and render a full correction for a detected grid.
///
/// Plans the warp of every beat onto its ideal position, applies it, and
/// returns a reversible command pairing the original and corrected states.
///
/// # Errors
///
/// Propagates planning and warp errors; see [`plan`] and [`apply_plan`].
pub fn correct(
    buffer: &PcmBuffer,
    grid: &BeatGrid,
    config: &EngineConfig,
) -> Result<CorrectionCommand, EngineError> {
    let ideal = grid.ideal();
    let correction_plan = plan(grid, &ideal, buffer.len_samples())?;
    let corrected = apply_plan(buffer, &correction_plan, config)?;
    Ok(CorrectionCommand::new(
        TrackState {
            buffer: buffer.clone(),
            grid: grid.clone(),
        },
        TrackState {
            buffer: corrected,
            grid: ideal,
        },
    ))
}
