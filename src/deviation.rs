//! Beat deviation analysis
//!
//! Measures how far each detected beat sits from an idealized constant-tempo
//! grid anchored at the first beat. Pure and deterministic: same grid and
//! threshold, same report.

use crate::analysis::result::BeatGrid;
use serde::{Deserialize, Serialize};

/// Deviation of one beat from its ideal grid position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatDeviation {
    /// Beat index within the grid.
    pub index: usize,
    /// Detected sample position.
    pub position: usize,
    /// Ideal position: `anchor + index * beat_period` (fractional samples).
    pub ideal_position: f64,
    /// `|position - ideal_position| / beat_period * 100`.
    pub deviation_pct: f64,
}

/// Whether the track needs correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// No beat exceeds the tolerance threshold.
    BeatsRegular,
    /// At least one beat exceeds the tolerance threshold.
    CorrectionRecommended,
}

/// Full deviation report for a detected grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationReport {
    /// Per-beat deviations. Empty when the grid has fewer than two beats
    /// (no period to measure against).
    pub deviations: Vec<BeatDeviation>,
    /// Arithmetic mean of all per-beat deviations; always reported, 0 for
    /// empty deviation sets.
    pub average_deviation_pct: f64,
    /// Indices of beats whose deviation strictly exceeds the tolerance.
    /// A beat sitting exactly on the threshold is not irregular.
    pub irregular: Vec<usize>,
    /// The tolerance the report was evaluated against, in percent.
    pub tolerance_pct: f64,
    /// Derived purely from whether `irregular` is empty.
    pub verdict: Verdict,
}

impl DeviationReport {
    /// True if no beat was flagged irregular.
    #[inline]
    pub fn is_regular(&self) -> bool {
        self.irregular.is_empty()
    }
}

/// Evaluate per-beat deviations against an ideal grid.
///
/// The ideal grid originates at the first detected beat; subsequent ideal
/// positions are `anchor + i * (60 / bpm * sample_rate)`. Grids with fewer
/// than two beats, or without a tempo, produce an empty deviation set.
pub fn evaluate(grid: &BeatGrid, tolerance_pct: f64) -> DeviationReport {
    let empty = DeviationReport {
        deviations: Vec::new(),
        average_deviation_pct: 0.0,
        irregular: Vec::new(),
        tolerance_pct,
        verdict: Verdict::BeatsRegular,
    };

    let period = match grid.beat_interval_samples() {
        Some(p) if p > 0.0 => p,
        _ => return empty,
    };
    if grid.len() < 2 {
        return empty;
    }

    let anchor = grid.beats()[0].position as f64;
    let deviations: Vec<BeatDeviation> = grid
        .beats()
        .iter()
        .map(|beat| {
            let ideal_position = anchor + beat.index as f64 * period;
            let deviation_pct = (beat.position as f64 - ideal_position).abs() / period * 100.0;
            BeatDeviation {
                index: beat.index,
                position: beat.position,
                ideal_position,
                deviation_pct,
            }
        })
        .collect();

    let average_deviation_pct =
        deviations.iter().map(|d| d.deviation_pct).sum::<f64>() / deviations.len() as f64;

    let irregular: Vec<usize> = deviations
        .iter()
        .filter(|d| d.deviation_pct > tolerance_pct)
        .map(|d| d.index)
        .collect();

    let verdict = if irregular.is_empty() {
        Verdict::BeatsRegular
    } else {
        Verdict::CorrectionRecommended
    };

    log::debug!(
        "Deviation report: {} beats, avg {:.3}%, {} irregular (tolerance {:.1}%)",
        deviations.len(),
        average_deviation_pct,
        irregular.len(),
        tolerance_pct
    );

    DeviationReport {
        deviations,
        average_deviation_pct,
        irregular,
        tolerance_pct,
        verdict,
    }
}
