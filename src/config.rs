//! Configuration parameters for analysis and correction

use serde::{Deserialize, Serialize};

/// Time signature, consumed for beat-accent grouping only.
///
/// The correction path never looks at this; it exists so the host's metronome
/// scheduler can group beats into bars from the same configuration object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Beats per bar (numerator), e.g. 4 in 4/4.
    pub beats_per_bar: u8,
    /// Note value of one beat (denominator), e.g. 4 in 4/4.
    pub note_value: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats_per_bar: 4,
            note_value: 4,
        }
    }
}

/// Engine configuration parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // Deviation policy
    /// Tolerance threshold in percent of the beat period (default: 10.0).
    /// Beats whose deviation strictly exceeds this are flagged irregular.
    pub tolerance_pct: f64,

    // BPM detection
    /// Minimum BPM to consider (default: 60.0)
    pub min_bpm: f64,

    /// Maximum BPM to consider (default: 180.0)
    pub max_bpm: f64,

    /// Search radius for snapping each expected beat to a local energy
    /// maximum, in percent of the beat period (default: 10.0). Independent
    /// of `tolerance_pct`, which only affects deviation reporting.
    pub search_window_pct: f64,

    // Onset envelope parameters
    /// Frame size for the energy envelope (default: 2048)
    pub frame_size: usize,

    /// Hop size between envelope frames (default: 512)
    pub hop_size: usize,

    /// Onset threshold in dB relative to the maximum flux (default: -20.0)
    pub onset_threshold_db: f32,

    // Coarse pass
    /// How many seconds of audio the fast coarse estimator scans (default: 12.0).
    /// The refined pass always covers the full buffer.
    pub coarse_window_seconds: f64,

    // Time-warp
    /// Crossfade length at segment splice points in milliseconds (default: 5.0)
    pub crossfade_ms: f64,

    /// FFT size for the phase vocoder (default: 2048)
    pub vocoder_fft_size: usize,

    // Metronome collaborator
    /// Time signature for beat-accent grouping (default: 4/4)
    pub time_signature: TimeSignature,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tolerance_pct: 10.0,
            min_bpm: 60.0,
            max_bpm: 180.0,
            search_window_pct: 10.0,
            frame_size: 2048,
            hop_size: 512,
            onset_threshold_db: -20.0,
            coarse_window_seconds: 12.0,
            crossfade_ms: 5.0,
            vocoder_fft_size: 2048,
            time_signature: TimeSignature::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.tolerance_pct, 10.0);
        assert_eq!(config.min_bpm, 60.0);
        assert_eq!(config.max_bpm, 180.0);
        assert_eq!(config.search_window_pct, 10.0);
        assert_eq!(config.time_signature.beats_per_bar, 4);
    }
}
