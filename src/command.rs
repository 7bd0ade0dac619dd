//! Undoable correction commands
//!
//! Correction never edits audio in place: the warp stage produces a new
//! buffer, and a command pairs the before and after states. Undo and redo
//! are pure state swaps; since [`PcmBuffer`] shares its sample storage,
//! both directions are O(1) in audio data and bit-exact.

use crate::analysis::result::BeatGrid;
use crate::buffer::PcmBuffer;

/// A track's audio plus the grid that describes it.
#[derive(Debug, Clone)]
pub struct TrackState {
    pub buffer: PcmBuffer,
    pub grid: BeatGrid,
}

/// Reversible correction holding complete before and after snapshots.
#[derive(Debug, Clone)]
pub struct CorrectionCommand {
    before: TrackState,
    after: TrackState,
}

impl CorrectionCommand {
    pub fn new(before: TrackState, after: TrackState) -> Self {
        Self { before, after }
    }

    /// State prior to correction.
    #[inline]
    pub fn before(&self) -> &TrackState {
        &self.before
    }

    /// State after correction.
    #[inline]
    pub fn after(&self) -> &TrackState {
        &self.after
    }

    /// Move `state` to the corrected snapshot. Idempotent.
    pub fn apply(&self, state: &mut TrackState) {
        log::debug!(
            "Applying correction: {} -> {} samples",
            self.before.buffer.len_samples(),
            self.after.buffer.len_samples()
        );
        *state = self.after.clone();
    }

    /// Move `state` back to the original snapshot. Idempotent.
    pub fn revert(&self, state: &mut TrackState) {
        log::debug!(
            "Reverting correction: {} -> {} samples",
            self.after.buffer.len_samples(),
            self.before.buffer.len_samples()
        );
        *state = self.before.clone();
    }
}
