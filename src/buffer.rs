//! Immutable PCM buffer
//!
//! The engine operates over a decoded PCM buffer supplied by an external
//! decoder. The buffer is planar (one `Vec<f32>` per channel) and immutable
//! once constructed; every stage that "edits" audio produces a new buffer.
//! That makes undo/redo a cheap reference swap with no locking.

use crate::error::EngineError;
use std::sync::Arc;

/// Immutable, planar PCM audio buffer.
///
/// Channel data is shared behind an [`Arc`], so cloning a buffer (for
/// snapshots, undo history, or handing a copy to playback) is O(1).
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Arc<Vec<Vec<f32>>>,
}

impl PcmBuffer {
    /// Create a buffer from planar channel data.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidInput` if:
    /// - `sample_rate` is 0
    /// - there are no channels
    /// - channels have differing lengths
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, EngineError> {
        if sample_rate == 0 {
            return Err(EngineError::InvalidInput(
                "Sample rate must be > 0".to_string(),
            ));
        }
        if channels.is_empty() {
            return Err(EngineError::InvalidInput(
                "Buffer must have at least one channel".to_string(),
            ));
        }
        let len = channels[0].len();
        if channels.iter().any(|ch| ch.len() != len) {
            return Err(EngineError::InvalidInput(
                "All channels must have the same length".to_string(),
            ));
        }
        Ok(Self {
            sample_rate,
            channels: Arc::new(channels),
        })
    }

    /// Create a mono buffer from a single channel of samples.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, EngineError> {
        Self::new(vec![samples], sample_rate)
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples per channel.
    #[inline]
    pub fn len_samples(&self) -> usize {
        self.channels[0].len()
    }

    /// True if the buffer holds no audio.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len_samples() == 0
    }

    /// Duration in seconds.
    #[inline]
    pub fn duration_seconds(&self) -> f64 {
        self.len_samples() as f64 / self.sample_rate as f64
    }

    /// Read-only view of one channel.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Read-only view of all channels.
    #[inline]
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Mix all channels down to a mono signal by averaging.
    ///
    /// Returns `EngineError::OutOfMemory` if the mixdown cannot be allocated.
    pub fn mix_to_mono(&self) -> Result<Vec<f32>, EngineError> {
        let len = self.len_samples();
        if self.channel_count() == 1 {
            return Ok(self.channels[0].clone());
        }

        let mut mono = Vec::new();
        mono.try_reserve_exact(len)
            .map_err(|e| EngineError::OutOfMemory(format!("mono mixdown: {}", e)))?;

        let scale = 1.0 / self.channel_count() as f32;
        for i in 0..len {
            let sum: f32 = self.channels.iter().map(|ch| ch[i]).sum();
            mono.push(sum * scale);
        }
        Ok(mono)
    }

    /// True if both buffers hold the same audio within `tolerance` per sample.
    pub fn approx_eq(&self, other: &PcmBuffer, tolerance: f32) -> bool {
        if self.sample_rate != other.sample_rate
            || self.channel_count() != other.channel_count()
            || self.len_samples() != other.len_samples()
        {
            return false;
        }
        self.channels
            .iter()
            .zip(other.channels.iter())
            .all(|(a, b)| {
                a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| (x - y).abs() <= tolerance)
            })
    }

    /// True if both buffers share the same underlying sample storage.
    ///
    /// Used by tests to verify that undo/redo is a pure reference swap.
    pub fn shares_storage_with(&self, other: &PcmBuffer) -> bool {
        Arc::ptr_eq(&self.channels, &other.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid() {
        let buf = PcmBuffer::new(vec![vec![0.0; 100], vec![0.0; 100]], 44100).unwrap();
        assert_eq!(buf.sample_rate(), 44100);
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.len_samples(), 100);
    }

    #[test]
    fn test_new_rejects_zero_sample_rate() {
        assert!(PcmBuffer::new(vec![vec![0.0; 10]], 0).is_err());
    }

    #[test]
    fn test_new_rejects_no_channels() {
        assert!(PcmBuffer::new(vec![], 44100).is_err());
    }

    #[test]
    fn test_new_rejects_mismatched_lengths() {
        assert!(PcmBuffer::new(vec![vec![0.0; 10], vec![0.0; 11]], 44100).is_err());
    }

    #[test]
    fn test_mix_to_mono_averages() {
        let buf = PcmBuffer::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 44100).unwrap();
        let mono = buf.mix_to_mono().unwrap();
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn test_mix_to_mono_single_channel_passthrough() {
        let buf = PcmBuffer::mono(vec![0.25, -0.5], 48000).unwrap();
        assert_eq!(buf.mix_to_mono().unwrap(), vec![0.25, -0.5]);
    }

    #[test]
    fn test_clone_shares_storage() {
        let buf = PcmBuffer::mono(vec![0.0; 1000], 44100).unwrap();
        let copy = buf.clone();
        assert!(buf.shares_storage_with(&copy));
    }

    #[test]
    fn test_approx_eq() {
        let a = PcmBuffer::mono(vec![0.5, 0.5], 44100).unwrap();
        let b = PcmBuffer::mono(vec![0.5 + 1e-7, 0.5], 44100).unwrap();
        assert!(a.approx_eq(&b, 1e-6));
        assert!(!a.approx_eq(&b, 1e-9));
    }

    #[test]
    fn test_duration() {
        let buf = PcmBuffer::mono(vec![0.0; 44100], 44100).unwrap();
        assert!((buf.duration_seconds() - 1.0).abs() < 1e-9);
    }
}
