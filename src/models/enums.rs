//! Core enums used throughout the engine.

use serde::{Deserialize, Serialize};

/// Type of media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Subtitles,
}

impl TrackKind {
    /// Parse the type string reported by mkvmerge -J.
    pub fn from_probe_str(s: &str) -> Option<Self> {
        match s {
            "video" => Some(TrackKind::Video),
            "audio" => Some(TrackKind::Audio),
            "subtitles" => Some(TrackKind::Subtitles),
            _ => None,
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Subtitles => write!(f, "subtitles"),
        }
    }
}

/// Lifecycle state of a remux job.
///
/// `Pending → Probing → Planning → Executing → {Completed, Failed,
/// Cancelled}`. Any non-terminal state may move to `Cancelled`. Terminal
/// states accept no further transitions; re-running a failed job means
/// creating a new job with the same configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Probing,
    Planning,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this state accepts no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a transition to `next` is legal.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Pending => false,
            JobStatus::Probing => *self == JobStatus::Pending,
            JobStatus::Planning => *self == JobStatus::Probing,
            JobStatus::Executing => *self == JobStatus::Planning,
            JobStatus::Completed => *self == JobStatus::Executing,
            JobStatus::Failed => matches!(
                self,
                JobStatus::Probing | JobStatus::Planning | JobStatus::Executing
            ),
            JobStatus::Cancelled => true,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Confidence of an episode-number match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    /// Explicit episode marker (S01E03, EP03, Episode 3).
    Exact,
    /// Bare numeric token (" - 03 ", "03_").
    Fuzzy,
}

/// Which input set a file came from during matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSide {
    Primary,
    Secondary,
}

impl std::fmt::Display for SourceSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSide::Primary => write!(f, "primary"),
            SourceSide::Secondary => write!(f, "secondary"),
        }
    }
}
