//! Per-job execution state and the single-job driver.
//!
//! A `JobHandle` is the shared, thread-safe view of one job: its current
//! lifecycle state, progress, failure detail, and cancellation token.
//! The driver walks the state machine `Pending → Probing → Planning →
//! Executing → terminal`, enforcing the legal transitions at every step.

use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::RwLock;
use thiserror::Error;

use crate::models::{JobStatus, RemuxJob};
use crate::mux::{MuxBackend, MuxExecutionError};
use crate::plan::ProbeSet;
use crate::probe::{ProbeError, Prober};
use crate::process::CancelToken;

use super::events::JobEvent;

/// An attempted illegal lifecycle transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    progress: u8,
    error: Option<String>,
}

#[derive(Debug)]
struct JobInner {
    job: RemuxJob,
    state: RwLock<JobState>,
    cancel: CancelToken,
}

/// Shared view of one running (or queued, or finished) job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    inner: Arc<JobInner>,
}

impl JobHandle {
    pub fn new(job: RemuxJob) -> Self {
        Self {
            inner: Arc::new(JobInner {
                job,
                state: RwLock::new(JobState {
                    status: JobStatus::Pending,
                    progress: 0,
                    error: None,
                }),
                cancel: CancelToken::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.job.id
    }

    pub fn job(&self) -> &RemuxJob {
        &self.inner.job
    }

    pub fn status(&self) -> JobStatus {
        self.inner.state.read().status
    }

    /// Completion percentage, 0..=100.
    pub fn progress(&self) -> u8 {
        self.inner.state.read().progress
    }

    /// Failure detail, set when the job reaches `Failed`.
    pub fn error(&self) -> Option<String> {
        self.inner.state.read().error.clone()
    }

    /// Request cancellation. Terminal jobs are unaffected; a queued job
    /// is cancelled when a worker picks it up.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    /// Move to `next`, enforcing the state machine.
    pub fn transition(&self, next: JobStatus) -> Result<(), TransitionError> {
        let mut state = self.inner.state.write();
        if !state.status.can_transition_to(next) {
            return Err(TransitionError {
                from: state.status,
                to: next,
            });
        }
        tracing::debug!(job = self.id(), from = %state.status, to = %next, "job transition");
        state.status = next;
        Ok(())
    }

    /// Raise progress to `percent`. Progress never moves backwards.
    pub fn set_progress(&self, percent: u8) {
        let mut state = self.inner.state.write();
        if percent > state.progress {
            state.progress = percent.min(100);
        }
    }

    fn set_error(&self, detail: impl Into<String>) {
        self.inner.state.write().error = Some(detail.into());
    }
}

// Coarse progress marks for the pre-execution stages; the execution
// stage maps tool progress onto the remaining span.
const PROGRESS_PROBING: u8 = 2;
const PROGRESS_PLANNING: u8 = 10;

/// Drive one job through its full lifecycle.
///
/// Never panics on job failure; faults land in the handle as `Failed`
/// with detail, and the terminal event is always emitted.
pub(crate) fn drive_job(
    handle: &JobHandle,
    prober: &dyn Prober,
    backend: &dyn MuxBackend,
    events: &Sender<JobEvent>,
) {
    let emit = |event: JobEvent| {
        let _ = events.send(event);
    };
    let set_status = |status: JobStatus| -> bool {
        match handle.transition(status) {
            Ok(()) => {
                emit(JobEvent::StatusChanged {
                    job_id: handle.id().to_string(),
                    status,
                });
                true
            }
            Err(e) => {
                tracing::error!(job = handle.id(), %e, "refused transition");
                false
            }
        }
    };
    let finish = |status: JobStatus, error: Option<String>| {
        if let Some(detail) = &error {
            handle.set_error(detail.clone());
            tracing::error!(job = handle.id(), detail, "job failed");
        }
        if set_status(status) && status == JobStatus::Completed {
            handle.set_progress(100);
        }
        emit(JobEvent::Finished {
            job_id: handle.id().to_string(),
            status: handle.status(),
            error,
        });
    };

    if handle.is_cancel_requested() {
        finish(JobStatus::Cancelled, None);
        return;
    }

    // Probing: fresh track enumeration for every source the job references.
    if !set_status(JobStatus::Probing) {
        return;
    }
    handle.set_progress(PROGRESS_PROBING);
    emit(JobEvent::Progress {
        job_id: handle.id().to_string(),
        percent: PROGRESS_PROBING,
    });

    let mut probes = ProbeSet::new();
    for source in handle.job().source_paths() {
        if handle.is_cancel_requested() {
            finish(JobStatus::Cancelled, None);
            return;
        }
        match prober.probe(&source, handle.cancel_token()) {
            Ok(tracks) => probes.insert(source, tracks),
            Err(ProbeError::Cancelled) => {
                finish(JobStatus::Cancelled, None);
                return;
            }
            Err(e) => {
                finish(JobStatus::Failed, Some(e.to_string()));
                return;
            }
        }
    }

    if handle.is_cancel_requested() {
        finish(JobStatus::Cancelled, None);
        return;
    }

    // Planning: resolve metadata and validate against the fresh probes.
    if !set_status(JobStatus::Planning) {
        return;
    }
    handle.set_progress(PROGRESS_PLANNING);
    emit(JobEvent::Progress {
        job_id: handle.id().to_string(),
        percent: PROGRESS_PLANNING,
    });

    let plan = match backend.plan(handle.job(), &probes) {
        Ok(plan) => plan,
        Err(e) => {
            finish(JobStatus::Failed, Some(e.to_string()));
            return;
        }
    };

    if handle.is_cancel_requested() {
        finish(JobStatus::Cancelled, None);
        return;
    }

    // Executing: tool progress 0..=100 maps onto the remaining span.
    if !set_status(JobStatus::Executing) {
        return;
    }
    let span = 100 - PROGRESS_PLANNING;
    let mut on_progress = |tool_pct: u8| {
        let percent = PROGRESS_PLANNING + (tool_pct as u16 * span as u16 / 100) as u8;
        handle.set_progress(percent);
        emit(JobEvent::Progress {
            job_id: handle.id().to_string(),
            percent: handle.progress(),
        });
    };

    match backend.execute(&plan, &mut on_progress, handle.cancel_token()) {
        Ok(outcome) => {
            tracing::info!(
                job = handle.id(),
                output = %outcome.output_path.display(),
                "job completed"
            );
            finish(JobStatus::Completed, None);
        }
        Err(MuxExecutionError::Cancelled { confirmed }) => {
            if !confirmed {
                tracing::error!(job = handle.id(), "cancelled but child termination unconfirmed");
            }
            finish(JobStatus::Cancelled, None);
        }
        Err(e) => finish(JobStatus::Failed, Some(e.to_string())),
    }
}
