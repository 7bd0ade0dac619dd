//! Cubic resampling
//!
//! Catmull-Rom interpolation used to fit rendered audio to an exact sample
//! count. Segment targets are authoritative: the vocoder's overlap-add output
//! only approximates the planned length, and this stage pins it down.

/// Catmull-Rom interpolation between `p1` and `p2` at fraction `t`.
#[inline]
pub fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

/// Resample `input` to exactly `target_len` samples.
///
/// Equal lengths short-circuit to an exact copy so unchanged audio survives
/// bit for bit. Edge samples are clamped for the interpolation neighborhood.
pub fn stretch_cubic(input: &[f32], target_len: usize) -> Vec<f32> {
    if target_len == 0 || input.is_empty() {
        return Vec::new();
    }
    if input.len() == target_len {
        return input.to_vec();
    }
    if input.len() == 1 {
        return vec![input[0]; target_len];
    }

    let step = (input.len() - 1) as f64 / (target_len - 1).max(1) as f64;
    let last = input.len() - 1;
    let mut output = Vec::with_capacity(target_len);
    for j in 0..target_len {
        let pos = j as f64 * step;
        let i = (pos as usize).min(last - 1);
        let t = (pos - i as f64) as f32;

        let p0 = input[i.saturating_sub(1)];
        let p1 = input[i];
        let p2 = input[i + 1];
        let p3 = input[(i + 2).min(last)];
        output.push(catmull_rom(p0, p1, p2, p3, t));
    }
    output
}
