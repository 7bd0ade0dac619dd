//! Background analysis execution
//!
//! Runs detection on a worker thread so callers stay responsive. Progress
//! flows back over a channel: the provisional coarse estimate first, then the
//! final outcome. The handle owns a shared cancellation flag; raising it makes
//! the worker abandon the run at its next checkpoint and report `Cancelled`
//! without a partial result.

use crate::analysis::result::{AnalysisReport, TempoEstimate};
use crate::buffer::PcmBuffer;
use crate::config::EngineConfig;
use crate::detector;
use crate::error::EngineError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Progress message from a running analysis.
#[derive(Debug)]
pub enum Progress {
    /// Provisional tempo from the coarse pass. `None` means the coarse pass
    /// could not produce an estimate, which is distinct from a zero tempo.
    CoarseReady(Option<TempoEstimate>),
    /// Terminal message; nothing follows it.
    Finished(AnalysisOutcome),
}

/// Terminal state of an analysis run.
#[derive(Debug)]
pub enum AnalysisOutcome {
    /// Analysis ran to completion. The report may still be inconclusive.
    Completed(AnalysisReport),
    /// The run was cancelled; no partial grid is exposed.
    Cancelled,
    /// The run failed before producing a report.
    Failed(EngineError),
}

/// Handle to a running background analysis.
///
/// Dropping the handle cancels the run and joins the worker.
pub struct AnalysisHandle {
    cancel: Arc<AtomicBool>,
    progress: Receiver<Progress>,
    worker: Option<JoinHandle<()>>,
}

impl AnalysisHandle {
    /// Request cancellation. Idempotent; the worker notices at its next
    /// checkpoint and finishes with [`AnalysisOutcome::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Blocking receive of the next progress message.
    ///
    /// Returns `None` once the worker has finished and the channel drained.
    pub fn recv_progress(&self) -> Option<Progress> {
        self.progress.recv().ok()
    }

    /// Receive the next progress message with a timeout.
    pub fn recv_progress_timeout(&self, timeout: Duration) -> Result<Progress, RecvTimeoutError> {
        self.progress.recv_timeout(timeout)
    }

    /// Block until the run finishes and return its outcome, discarding any
    /// intermediate progress still queued.
    pub fn wait(mut self) -> AnalysisOutcome {
        let outcome = loop {
            match self.progress.recv() {
                Ok(Progress::Finished(outcome)) => break outcome,
                Ok(_) => continue,
                // Worker gone without a terminal message; treat as cancelled
                Err(_) => break AnalysisOutcome::Cancelled,
            }
        };
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        outcome
    }
}

impl Drop for AnalysisHandle {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Spawn beat analysis of `buffer` on a worker thread.
///
/// The worker mixes the buffer to mono, runs the coarse and refined passes,
/// and reports progress through the returned handle.
pub fn spawn_analysis(buffer: PcmBuffer, config: EngineConfig) -> AnalysisHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_worker = Arc::clone(&cancel);
    let (sender, progress) = mpsc::channel();

    let worker = std::thread::spawn(move || {
        let sample_rate = buffer.sample_rate();
        let mono = match buffer.mix_to_mono() {
            Ok(mono) => mono,
            Err(e) => {
                let _ = sender.send(Progress::Finished(AnalysisOutcome::Failed(e)));
                return;
            }
        };

        let coarse_sender = sender.clone();
        let result = detector::detect(
            &mono,
            sample_rate,
            &config,
            &cancel_worker,
            &mut |estimate| {
                let _ = coarse_sender.send(Progress::CoarseReady(estimate));
            },
        );

        let outcome = match result {
            Ok(Some(report)) => AnalysisOutcome::Completed(report),
            Ok(None) => AnalysisOutcome::Cancelled,
            Err(e) => AnalysisOutcome::Failed(e),
        };
        let _ = sender.send(Progress::Finished(outcome));
    });

    AnalysisHandle {
        cancel,
        progress,
        worker: Some(worker),
    }
}
