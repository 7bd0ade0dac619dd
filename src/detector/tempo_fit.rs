//! Refined tempo fitting
//!
//! Turns the full-track onset list into a refined BPM with confidence:
//!
//! 1. Histogram of inter-onset intervals; the mode bucket gives a base period
//! 2. Octave/harmonic candidates (x0.25 .. x4) folded into the BPM range
//! 3. Each candidate scored by how well a constant grid at that tempo fits
//!    the observed onsets (weighted average + maximum phase deviation)
//! 4. Confidence from the interval agreement ratio through a sigmoid

/// Histogram bucket width in seconds (10 ms).
const BUCKET_SECONDS: f64 = 0.01;

/// Weight of the average deviation in the candidate score.
const AVG_WEIGHT: f64 = 0.7;

/// Weight of the maximum deviation in the candidate score.
const MAX_WEIGHT: f64 = 0.3;

/// Cap on onsets examined by the candidate scorer.
const SCORE_ONSET_LIMIT: usize = 512;

/// Minimum onsets needed for a meaningful histogram.
const MIN_ONSETS: usize = 4;

/// Refined tempo fit result.
#[derive(Debug, Clone, Copy)]
pub struct RefinedFit {
    /// Fitted BPM, folded into the configured range.
    pub bpm: f64,
    /// Confidence percentage, 0-100.
    pub confidence: u8,
}

/// Fit a tempo to the detected onsets.
///
/// Returns `None` when there are too few onsets to fit against — the caller
/// reports this as inconclusive analysis, not an error.
pub fn fit_tempo(
    onsets: &[usize],
    sample_rate: u32,
    min_bpm: f64,
    max_bpm: f64,
) -> Option<RefinedFit> {
    if onsets.len() < MIN_ONSETS {
        log::debug!(
            "Too few onsets for tempo fitting ({} < {})",
            onsets.len(),
            MIN_ONSETS
        );
        return None;
    }

    let intervals: Vec<f64> = onsets
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .collect();

    let (base_interval, agreement) = histogram_mode(&intervals, sample_rate)?;
    let base_bpm = 60.0 * sample_rate as f64 / base_interval;

    // Harmonic candidates folded into range; the fold means distinct
    // multiples can land on the same value, so deduplicate.
    let mut candidates: Vec<f64> = [0.25, 0.5, 1.0, 2.0, 4.0]
        .iter()
        .filter_map(|&m| fold_into_range(base_bpm * m, min_bpm, max_bpm))
        .collect();
    candidates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    candidates.dedup_by(|a, b| (*a - *b).abs() < 0.01);

    if candidates.is_empty() {
        return None;
    }

    let mut best_bpm = candidates[0];
    let mut best_score = f64::INFINITY;
    for &candidate in &candidates {
        let score = grid_deviation_score(onsets, candidate, sample_rate);
        log::debug!("Tempo candidate {:.2} BPM scored {:.4}", candidate, score);
        if score < best_score {
            best_score = score;
            best_bpm = candidate;
        }
    }

    let confidence = (sigmoid(agreement) * 100.0).round() as u8;
    log::debug!(
        "Refined fit: {:.2} BPM, agreement {:.2}, confidence {}",
        best_bpm,
        agreement,
        confidence
    );

    Some(RefinedFit {
        bpm: best_bpm,
        confidence,
    })
}

/// Mode of the interval histogram.
///
/// Returns the weighted mean interval of the mode bucket and its immediate
/// neighbors, plus the fraction of intervals that fell there (agreement).
fn histogram_mode(intervals: &[f64], sample_rate: u32) -> Option<(f64, f64)> {
    let bucket_width = BUCKET_SECONDS * sample_rate as f64;
    let max_interval = intervals.iter().cloned().fold(0.0f64, f64::max);
    let num_buckets = (max_interval / bucket_width).ceil() as usize + 1;
    if num_buckets == 0 {
        return None;
    }

    let mut histogram = vec![0u32; num_buckets];
    for &interval in intervals {
        let bucket = (interval / bucket_width) as usize;
        histogram[bucket] += 1;
    }

    let mode = histogram
        .iter()
        .enumerate()
        .max_by_key(|(_, &count)| count)
        .map(|(i, _)| i)?;

    // Weighted mean over mode bucket +- 1 for sub-bucket precision
    let lo = mode.saturating_sub(1) as f64 * bucket_width;
    let hi = (mode + 2) as f64 * bucket_width;
    let mut sum = 0.0;
    let mut count = 0usize;
    for &interval in intervals {
        if interval >= lo && interval < hi {
            sum += interval;
            count += 1;
        }
    }
    if count == 0 || sum <= 0.0 {
        return None;
    }

    let agreement = count as f64 / intervals.len() as f64;
    Some((sum / count as f64, agreement))
}

/// Fold a BPM into [min_bpm, max_bpm] by octave doubling/halving.
fn fold_into_range(bpm: f64, min_bpm: f64, max_bpm: f64) -> Option<f64> {
    if bpm <= 0.0 {
        return None;
    }
    let mut folded = bpm;
    while folded < min_bpm {
        folded *= 2.0;
    }
    while folded > max_bpm {
        folded *= 0.5;
    }
    if folded < min_bpm {
        // Range narrower than an octave and this harmonic skips over it
        return None;
    }
    Some(folded)
}

/// Score a candidate tempo by how far observed onsets sit from the nearest
/// position of a constant grid anchored at the first onset. Lower is better.
fn grid_deviation_score(onsets: &[usize], bpm: f64, sample_rate: u32) -> f64 {
    let interval = 60.0 * sample_rate as f64 / bpm;
    if interval <= 0.0 {
        return f64::INFINITY;
    }
    let anchor = onsets[0] as f64;
    let mut total = 0.0f64;
    let mut max_dev = 0.0f64;
    let considered = onsets.len().min(SCORE_ONSET_LIMIT);
    for &pos in onsets.iter().take(considered) {
        let phase = (pos as f64 - anchor) / interval;
        let deviation = (phase - phase.round()).abs();
        total += deviation;
        max_dev = max_dev.max(deviation);
    }
    let avg = total / considered as f64;
    avg * AVG_WEIGHT + max_dev * MAX_WEIGHT
}

/// Sigmoid mapping of a raw agreement ratio to (0, 1).
#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-5.0 * (x - 0.5)).exp())
}
