//! Execution plan: from a validated job to mkvmerge instructions.

mod builder;
mod options;

pub use builder::{ModeDefaults, PlanBuilder, PlanValidationError, ProbeSet, ACCEPTED_LANGUAGES};
pub use options::mkvmerge_tokens;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::TrackKind;

/// One mux instruction: a source stream plus its resolved metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuxInstruction {
    pub source_path: PathBuf,
    pub source_index: u32,
    pub kind: TrackKind,
    /// Resolved language (override, else mode default, else probed).
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub is_default: bool,
    pub is_forced: bool,
    /// Sync offset applied via `--sync`, in milliseconds.
    #[serde(default)]
    pub sync_offset_ms: i64,
}

/// Validated, ordered plan for one job, consumable by a mux backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxPlan {
    /// Id of the job this plan was built from.
    pub job_id: String,
    pub output_path: PathBuf,
    /// Instructions in output track order, video first.
    pub instructions: Vec<MuxInstruction>,
}
