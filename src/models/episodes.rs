//! Matched episode pairs for batch mode.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::enums::{MatchConfidence, SourceSide};

/// A matched pair of source files representing the same episode.
///
/// Created by the episode matcher, immutable once created, consumed to
/// build one remux job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Episode number, the matching key.
    pub number: u32,
    /// File from the primary set (e.g. Japanese-audio video).
    pub primary_file: PathBuf,
    /// File from the secondary set (e.g. Latin-audio video).
    pub secondary_file: PathBuf,
    /// Weaker of the two extraction confidences.
    pub confidence: MatchConfidence,
}

impl Episode {
    pub fn new(
        number: u32,
        primary_file: impl Into<PathBuf>,
        secondary_file: impl Into<PathBuf>,
        confidence: MatchConfidence,
    ) -> Self {
        Self {
            number,
            primary_file: primary_file.into(),
            secondary_file: secondary_file.into(),
            confidence,
        }
    }
}

impl std::fmt::Display for Episode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Episode {:02}: {} + {}",
            self.number,
            self.primary_file.display(),
            self.secondary_file.display()
        )
    }
}

/// Why a file could not be paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnmatchReason {
    /// No episode number could be extracted from the filename.
    NoEpisodeNumber,
    /// The number exists only on one side.
    NoCounterpart,
}

impl std::fmt::Display for UnmatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnmatchReason::NoEpisodeNumber => write!(f, "no episode number in filename"),
            UnmatchReason::NoCounterpart => write!(f, "no counterpart in the other set"),
        }
    }
}

/// A file excluded from pairing, reported rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedFile {
    /// The file that could not be paired.
    pub path: PathBuf,
    /// Which input set it came from.
    pub side: SourceSide,
    /// Why it was excluded.
    pub reason: UnmatchReason,
    /// Extracted number, when the reason is `NoCounterpart`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_display() {
        let ep = Episode::new(3, "/jp/e03.mkv", "/lat/e03.mkv", MatchConfidence::Exact);
        assert_eq!(ep.to_string(), "Episode 03: /jp/e03.mkv + /lat/e03.mkv");
    }

    #[test]
    fn unmatched_serializes_reason() {
        let entry = UnmatchedFile {
            path: PathBuf::from("/jp/opening.mkv"),
            side: SourceSide::Primary,
            reason: UnmatchReason::NoEpisodeNumber,
            number: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("NoEpisodeNumber"));
        assert!(!json.contains("number"));
    }
}
