//! Events emitted while a batch runs.

use serde::{Deserialize, Serialize};

use crate::models::JobStatus;

/// Progress and lifecycle notifications for observers.
///
/// Events are emitted over a channel; a dropped receiver never stalls
/// the workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// A job moved to a new lifecycle state.
    StatusChanged { job_id: String, status: JobStatus },

    /// Per-job completion percentage, monotonically non-decreasing.
    Progress { job_id: String, percent: u8 },

    /// A job reached a terminal state. `error` carries the failure
    /// detail for `Failed` jobs.
    Finished {
        job_id: String,
        status: JobStatus,
        error: Option<String>,
    },
}

/// Terminal tally for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    /// Every job completed successfully.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} cancelled",
            self.succeeded, self.failed, self.cancelled
        )
    }
}
