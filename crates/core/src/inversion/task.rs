//! Background execution of an inversion run
//!
//! A run is dispatched onto its own thread so the caller (typically a UI
//! thread) stays responsive. The returned [`InversionHandle`] polls, reports
//! progress, cancels and finally yields the posterior. Dropping a handle
//! cancels its run; a cancelled run never produces a partial posterior.

use super::posterior::SourcePosterior;
use crate::error::{PlumeError, PlumeResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;

/// Cancellation flag and progress counter shared by all chains of one run
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
}

impl RunControl {
    /// Fresh control, not cancelled, no progress
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; chains stop at their next iteration boundary
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Count one finished sampler iteration
    pub fn record_iteration(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Iterations finished so far across all chains
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}

/// State of a submitted run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Still sampling
    Running,
    /// Done; [`InversionHandle::wait`] returns immediately
    Finished,
}

/// Handle to an inversion running on a background thread
#[derive(Debug)]
pub struct InversionHandle {
    control: RunControl,
    total: usize,
    thread: Option<JoinHandle<PlumeResult<SourcePosterior>>>,
}

impl InversionHandle {
    /// Run `job` on a new named thread
    ///
    /// # Errors
    ///
    /// [`PlumeError::Io`] if the thread cannot be spawned.
    pub(crate) fn spawn<F>(control: RunControl, total: usize, job: F) -> PlumeResult<Self>
    where
        F: FnOnce(RunControl) -> PlumeResult<SourcePosterior> + Send + 'static,
    {
        let worker_control = control.clone();
        let thread = std::thread::Builder::new()
            .name("plume-inversion".to_string())
            .spawn(move || job(worker_control))?;
        Ok(Self {
            control,
            total,
            thread: Some(thread),
        })
    }

    /// Non-blocking status check
    pub fn poll(&self) -> TaskStatus {
        match &self.thread {
            Some(t) if !t.is_finished() => TaskStatus::Running,
            _ => TaskStatus::Finished,
        }
    }

    /// `(completed, total)` sampler iterations across all chains
    pub fn progress(&self) -> (usize, usize) {
        (self.control.completed().min(self.total), self.total)
    }

    /// Fraction of iterations completed, in `[0, 1]`
    pub fn fraction_complete(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        let (done, total) = self.progress();
        done as f64 / total as f64
    }

    /// Request cancellation without waiting
    pub fn cancel(&self) {
        debug!("Inversion cancellation requested");
        self.control.cancel();
    }

    /// Block until the run ends
    ///
    /// # Errors
    ///
    /// - [`PlumeError::Cancelled`] if the run was cancelled
    /// - [`PlumeError::TaskPanicked`] if the worker panicked
    /// - any error raised by the run itself
    pub fn wait(mut self) -> PlumeResult<SourcePosterior> {
        let thread = self.thread.take().ok_or(PlumeError::TaskPanicked)?;
        thread.join().map_err(|_| PlumeError::TaskPanicked)?
    }
}

impl Drop for InversionHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.control.cancel();
        }
    }
}
