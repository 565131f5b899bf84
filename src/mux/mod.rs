//! Mux execution via mkvmerge.
//!
//! The backend consumes a validated `MuxPlan` and drives the external
//! tool, reporting progress parsed from its stdout. An exit code of zero
//! is not trusted on its own: the output file must exist and be
//! non-empty before the run counts as a success.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::EngineConfig;
use crate::models::RemuxJob;
use crate::plan::{mkvmerge_tokens, MuxPlan, PlanBuilder, PlanValidationError, ProbeSet};
use crate::process::{self, CancelToken, RunStatus};

/// Mux execution failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MuxExecutionError {
    /// Planning failed before the tool was invoked.
    #[error(transparent)]
    InvalidPlan(#[from] PlanValidationError),

    /// The mux tool is not installed or not on PATH.
    #[error("mux tool not found: {0}")]
    ToolMissing(PathBuf),

    /// The tool failed or timed out.
    #[error("mux failed (exit code {exit_code:?}): {stderr_tail}")]
    ToolFailed {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    /// The tool reported success but the output file is missing or empty.
    #[error("mux produced no output at {0}")]
    EmptyOutput(PathBuf),

    /// The run was cancelled. `confirmed` is false when the child did
    /// not die within the grace period.
    #[error("mux cancelled (termination confirmed: {confirmed})")]
    Cancelled { confirmed: bool },
}

/// Result of a successful mux run.
#[derive(Debug, Clone)]
pub struct MuxOutcome {
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
}

/// Planning plus execution, behind one seam so the orchestrator can be
/// tested without the external tool.
pub trait MuxBackend: Send + Sync {
    /// Build a validated plan for a job.
    fn plan(&self, job: &RemuxJob, probes: &ProbeSet) -> Result<MuxPlan, PlanValidationError>;

    /// Execute a plan. `on_progress` receives percentages in 0..=100 as
    /// the tool reports them.
    fn execute(
        &self,
        plan: &MuxPlan,
        on_progress: &mut dyn FnMut(u8),
        cancel: &CancelToken,
    ) -> Result<MuxOutcome, MuxExecutionError>;
}

/// Backend driving `mkvmerge`.
pub struct MkvmergeMuxer {
    mkvmerge: PathBuf,
    timeout: std::time::Duration,
    grace: std::time::Duration,
    builder: PlanBuilder,
}

impl MkvmergeMuxer {
    pub fn new(config: &EngineConfig, builder: PlanBuilder) -> Self {
        Self {
            mkvmerge: config.tools.mkvmerge.clone(),
            timeout: config.timeouts.mux(),
            grace: config.timeouts.cancel_grace(),
            builder,
        }
    }
}

impl MuxBackend for MkvmergeMuxer {
    fn plan(&self, job: &RemuxJob, probes: &ProbeSet) -> Result<MuxPlan, PlanValidationError> {
        self.builder.build(job, probes)
    }

    fn execute(
        &self,
        plan: &MuxPlan,
        on_progress: &mut dyn FnMut(u8),
        cancel: &CancelToken,
    ) -> Result<MuxOutcome, MuxExecutionError> {
        let args = mkvmerge_tokens(plan);
        tracing::info!(job = %plan.job_id, output = %plan.output_path.display(), "starting mux");

        let outcome = process::run_command(
            &self.mkvmerge,
            &args,
            self.timeout,
            self.grace,
            Some(cancel),
            |line| {
                if let Some(pct) = parse_progress_line(line) {
                    on_progress(pct);
                }
            },
        )
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MuxExecutionError::ToolMissing(self.mkvmerge.clone())
            } else {
                MuxExecutionError::ToolFailed {
                    exit_code: None,
                    stderr_tail: e.to_string(),
                }
            }
        })?;

        match outcome.status {
            RunStatus::Cancelled { confirmed } => {
                return Err(MuxExecutionError::Cancelled { confirmed });
            }
            RunStatus::TimedOut => {
                return Err(MuxExecutionError::ToolFailed {
                    exit_code: None,
                    stderr_tail: format!("mux timed out after {:?}", self.timeout),
                });
            }
            RunStatus::Exited => {}
        }
        if !outcome.success() {
            return Err(MuxExecutionError::ToolFailed {
                exit_code: outcome.exit_code,
                stderr_tail: process::tail_lines(&outcome.stderr, 20),
            });
        }

        // Exit code zero alone is not proof of output.
        let size = std::fs::metadata(&plan.output_path).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(MuxExecutionError::EmptyOutput(plan.output_path.clone()));
        }

        tracing::info!(job = %plan.job_id, bytes = size, "mux finished");
        Ok(MuxOutcome {
            output_path: plan.output_path.clone(),
            output_size_bytes: size,
        })
    }
}

/// Parse an mkvmerge progress line (`Progress: 42%`).
pub fn parse_progress_line(line: &str) -> Option<u8> {
    let rest = line.trim().strip_prefix("Progress:")?.trim();
    let digits = rest.strip_suffix('%')?.trim();
    digits.parse::<u8>().ok().filter(|p| *p <= 100)
}
