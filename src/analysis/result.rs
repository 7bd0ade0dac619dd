//! Analysis result types

use crate::error::{validate_bpm, EngineError};
use serde::{Deserialize, Serialize};

/// Which pass produced a tempo estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempoSource {
    /// Fast low-resolution pre-pass; provisional, shown to the UI while
    /// refinement runs.
    Coarse,
    /// Full-buffer analysis with confidence scoring.
    Refined,
}

/// A tempo estimate with confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Beats per minute.
    pub bpm: f64,
    /// Self-reported reliability, 0-100.
    pub confidence: u8,
    /// Which pass produced this estimate.
    pub source: TempoSource,
}

impl TempoEstimate {
    /// Create an estimate, rejecting BPM outside the valid range.
    pub fn new(bpm: f64, confidence: u8, source: TempoSource) -> Result<Self, EngineError> {
        let bpm = validate_bpm(bpm)?;
        Ok(Self {
            bpm,
            confidence: confidence.min(100),
            source,
        })
    }

    /// Beat period in samples at the given sample rate.
    #[inline]
    pub fn beat_interval_samples(&self, sample_rate: u32) -> f64 {
        60.0 * sample_rate as f64 / self.bpm
    }
}

/// A single detected rhythmic pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beat {
    /// Sample position in the track. Non-negative, strictly increasing
    /// across a grid.
    pub position: usize,
    /// Index within the track's beat sequence.
    pub index: usize,
}

/// Ordered beat positions plus the tempo they were derived from.
///
/// A grid with no tempo (`tempo == None`) and no beats is the
/// "analysis inconclusive" state: the caller should treat it as
/// "no reliable grid", not as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    sample_rate: u32,
    tempo: Option<TempoEstimate>,
    beats: Vec<Beat>,
}

impl BeatGrid {
    /// Build a grid from beat sample positions and a tempo estimate.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` if positions are not strictly
    /// increasing or `sample_rate` is 0.
    pub fn new(
        positions: Vec<usize>,
        tempo: TempoEstimate,
        sample_rate: u32,
    ) -> Result<Self, EngineError> {
        if sample_rate == 0 {
            return Err(EngineError::InvalidInput(
                "Sample rate must be > 0".to_string(),
            ));
        }
        if positions.windows(2).any(|w| w[1] <= w[0]) {
            return Err(EngineError::InvalidInput(
                "Beat positions must be strictly increasing".to_string(),
            ));
        }
        let beats = positions
            .into_iter()
            .enumerate()
            .map(|(index, position)| Beat { position, index })
            .collect();
        Ok(Self {
            sample_rate,
            tempo: Some(tempo),
            beats,
        })
    }

    /// The inconclusive grid: no tempo, no beats.
    pub fn inconclusive(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            tempo: None,
            beats: Vec::new(),
        }
    }

    /// Synthesize a perfectly regular grid from an anchor position and a
    /// tempo, covering `len_samples` samples.
    ///
    /// This is how a host-supplied BPM (e.g. from file metadata) becomes a
    /// grid without running detection.
    pub fn from_tempo(
        tempo: TempoEstimate,
        anchor: usize,
        sample_rate: u32,
        len_samples: usize,
    ) -> Result<Self, EngineError> {
        if sample_rate == 0 {
            return Err(EngineError::InvalidInput(
                "Sample rate must be > 0".to_string(),
            ));
        }
        let interval = tempo.beat_interval_samples(sample_rate);
        let mut positions = Vec::new();
        let mut i = 0usize;
        loop {
            let pos = anchor as f64 + i as f64 * interval;
            if pos >= len_samples as f64 {
                break;
            }
            positions.push(pos.round() as usize);
            i += 1;
        }
        positions.dedup();
        Self::new(positions, tempo, sample_rate)
    }

    /// Sample rate the positions refer to.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Tempo estimate this grid was derived from, if any.
    #[inline]
    pub fn tempo(&self) -> Option<TempoEstimate> {
        self.tempo
    }

    /// Detected beats, ordered by position.
    #[inline]
    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    /// Number of beats.
    #[inline]
    pub fn len(&self) -> usize {
        self.beats.len()
    }

    /// True if the grid holds no beats.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    /// True if analysis could not produce a reliable grid.
    #[inline]
    pub fn is_inconclusive(&self) -> bool {
        self.tempo.is_none() || self.beats.is_empty()
    }

    /// Confidence of the underlying tempo estimate; 0 when inconclusive.
    #[inline]
    pub fn confidence(&self) -> u8 {
        if self.is_inconclusive() {
            0
        } else {
            self.tempo.map(|t| t.confidence).unwrap_or(0)
        }
    }

    /// Beat period in samples, if a tempo is known.
    #[inline]
    pub fn beat_interval_samples(&self) -> Option<f64> {
        self.tempo
            .map(|t| t.beat_interval_samples(self.sample_rate))
    }

    /// The idealized constant-spacing grid anchored at the first beat.
    ///
    /// `ideal[i] = anchor + i * beat_interval`, rounded to whole samples.
    /// Grids with fewer than two beats are returned unchanged (there is no
    /// period to regularize against). Positions that collapse onto the same
    /// sample after rounding (sub-sample beat periods) are deduplicated so
    /// the result upholds the strictly-increasing invariant.
    pub fn ideal(&self) -> BeatGrid {
        let (tempo, interval) = match (self.tempo, self.beat_interval_samples()) {
            (Some(t), Some(iv)) => (t, iv),
            _ => return self.clone(),
        };
        if self.beats.len() < 2 {
            return self.clone();
        }
        let anchor = self.beats[0].position as f64;
        let mut positions: Vec<usize> = (0..self.beats.len())
            .map(|i| (anchor + i as f64 * interval).round() as usize)
            .collect();
        positions.dedup();
        let beats = positions
            .into_iter()
            .enumerate()
            .map(|(index, position)| Beat { position, index })
            .collect();
        BeatGrid {
            sample_rate: self.sample_rate,
            tempo: Some(tempo),
            beats,
        }
    }

    /// Indices of accented beats (beat 1 of each bar) for the given beats
    /// per bar. Consumed by the metronome collaborator, not by correction.
    pub fn accent_indices(&self, beats_per_bar: u8) -> Vec<usize> {
        if beats_per_bar == 0 {
            return Vec::new();
        }
        self.beats
            .iter()
            .map(|b| b.index)
            .filter(|i| i % beats_per_bar as usize == 0)
            .collect()
    }
}

/// Complete detector output: the coarse estimate (if one was found), and the
/// detected grid, which carries the refined estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Provisional estimate from the fast pre-pass; `None` means
    /// "no estimate available", which is distinct from a zero value.
    pub coarse: Option<TempoEstimate>,
    /// Refined full-analysis estimate; `None` when analysis was inconclusive.
    pub refined: Option<TempoEstimate>,
    /// The detected beat grid (empty when inconclusive).
    pub grid: BeatGrid,
}

impl AnalysisReport {
    /// True if the refined pass could not produce a reliable grid.
    #[inline]
    pub fn is_inconclusive(&self) -> bool {
        self.refined.is_none() || self.grid.is_inconclusive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempo(bpm: f64) -> TempoEstimate {
        TempoEstimate::new(bpm, 90, TempoSource::Refined).unwrap()
    }

    #[test]
    fn test_tempo_estimate_rejects_invalid_bpm() {
        assert!(TempoEstimate::new(0.0, 50, TempoSource::Coarse).is_err());
        assert!(TempoEstimate::new(10000.0, 50, TempoSource::Coarse).is_err());
    }

    #[test]
    fn test_tempo_estimate_clamps_confidence() {
        let t = TempoEstimate::new(120.0, 250, TempoSource::Refined).unwrap();
        assert_eq!(t.confidence, 100);
    }

    #[test]
    fn test_beat_interval_samples() {
        let t = tempo(120.0);
        assert!((t.beat_interval_samples(44100) - 22050.0).abs() < 1e-9);
        let t = tempo(128.0);
        assert!((t.beat_interval_samples(48000) - 22500.0).abs() < 1e-9);
    }

    #[test]
    fn test_grid_rejects_non_increasing_positions() {
        assert!(BeatGrid::new(vec![0, 100, 100], tempo(120.0), 44100).is_err());
        assert!(BeatGrid::new(vec![100, 50], tempo(120.0), 44100).is_err());
    }

    #[test]
    fn test_grid_indices_assigned_in_order() {
        let grid = BeatGrid::new(vec![10, 20, 30], tempo(120.0), 44100).unwrap();
        let indices: Vec<usize> = grid.beats().iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_inconclusive_grid() {
        let grid = BeatGrid::inconclusive(44100);
        assert!(grid.is_inconclusive());
        assert_eq!(grid.confidence(), 0);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_from_tempo_regular_spacing() {
        let grid = BeatGrid::from_tempo(tempo(120.0), 0, 44100, 44100 * 2).unwrap();
        let positions: Vec<usize> = grid.beats().iter().map(|b| b.position).collect();
        assert_eq!(positions, vec![0, 22050, 44100, 66150]);
    }

    #[test]
    fn test_ideal_anchored_at_first_beat() {
        // Detected beats drift; ideal positions come from anchor + i * interval
        let grid = BeatGrid::new(vec![100, 22200, 44100], tempo(120.0), 44100).unwrap();
        let ideal = grid.ideal();
        let positions: Vec<usize> = ideal.beats().iter().map(|b| b.position).collect();
        assert_eq!(positions, vec![100, 22150, 44200]);
    }

    #[test]
    fn test_ideal_deduplicates_collapsed_positions() {
        // Sub-sample beat period: 9000 BPM at 10 Hz rounds every ideal
        // position onto the anchor; the result must stay strictly increasing
        let t = TempoEstimate::new(9000.0, 90, TempoSource::Refined).unwrap();
        let grid = BeatGrid::new(vec![0, 1, 2], t, 10).unwrap();
        let ideal = grid.ideal();
        assert!(ideal
            .beats()
            .windows(2)
            .all(|w| w[1].position > w[0].position));
        assert_eq!(ideal.len(), 1);
    }

    #[test]
    fn test_ideal_of_single_beat_grid_is_identity() {
        let grid = BeatGrid::new(vec![500], tempo(120.0), 44100).unwrap();
        assert_eq!(grid.ideal(), grid);
    }

    #[test]
    fn test_accent_indices_four_four() {
        let grid =
            BeatGrid::new((0..8).map(|i| i * 1000).collect(), tempo(120.0), 44100).unwrap();
        assert_eq!(grid.accent_indices(4), vec![0, 4]);
        assert!(grid.accent_indices(0).is_empty());
    }

    #[test]
    fn test_report_serializes() {
        let report = AnalysisReport {
            coarse: None,
            refined: Some(tempo(120.0)),
            grid: BeatGrid::new(vec![0, 22050], tempo(120.0), 44100).unwrap(),
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.grid.len(), 2);
    }
}
