//! Synthetic signals shared across test modules.

/// Mono kick-drum pattern: a decaying 60 Hz sine burst on every beat of a
/// constant-tempo click track, silence in between.
pub fn kick_pattern(duration_seconds: f64, bpm: f64, sample_rate: u32) -> Vec<f32> {
    let sr = sample_rate as f64;
    let total = (duration_seconds * sr) as usize;
    let interval = 60.0 / bpm * sr;
    let kick_len = ((0.1 * sr) as usize).max(1);

    let mut samples = vec![0.0f32; total];
    let mut beat_start = 0.0f64;
    while (beat_start as usize) < total {
        let start = beat_start as usize;
        for i in 0..kick_len.min(total - start) {
            let t = i as f64 / sr;
            let envelope = (-t * 40.0).exp();
            samples[start + i] = (envelope * (2.0 * std::f64::consts::PI * 60.0 * t).sin()) as f32;
        }
        beat_start += interval;
    }
    samples
}

/// Mono sine tone at `frequency` Hz with a fixed 0.5 amplitude.
pub fn sine_tone(duration_seconds: f64, frequency: f64, sample_rate: u32) -> Vec<f32> {
    let sr = sample_rate as f64;
    let total = (duration_seconds * sr) as usize;
    (0..total)
        .map(|i| {
            let t = i as f64 / sr;
            (0.5 * (2.0 * std::f64::consts::PI * frequency * t).sin()) as f32
        })
        .collect()
}
