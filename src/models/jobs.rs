//! Remux job definition with validated construction.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::enums::TrackKind;
use super::media::{Track, TrackKey, TrackOverride};

/// A structurally invalid job, rejected at construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidJobError {
    /// No video track in the selection.
    #[error("job has no video track")]
    NoVideoTrack,

    /// More than one video track in the selection.
    #[error("job has {0} video tracks, expected exactly one")]
    MultipleVideoTracks(usize),

    /// The same (source, index) pair selected twice.
    #[error("duplicate track selection: {0}")]
    DuplicateTrack(TrackKey),

    /// A metadata override references a track outside the selection.
    #[error("override references unselected track: {0}")]
    OrphanOverride(TrackKey),
}

/// One unit of remux work: a base video track plus the audio/subtitle
/// tracks to merge around it.
///
/// Construction validates the structural invariants; semantic validation
/// against probe results happens in the plan builder. Jobs are owned by
/// the orchestrator while executing and are never re-run: a retry is a
/// new job with the same configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemuxJob {
    /// Unique job id.
    pub id: String,
    /// Destination container path.
    pub output_path: PathBuf,
    /// Tracks to merge, video first.
    tracks: Vec<Track>,
    /// Per-track metadata overrides, keyed by track identity.
    overrides: HashMap<TrackKey, TrackOverride>,
    /// Creation timestamp (audit trail across retries).
    pub created_at: DateTime<Utc>,
}

impl RemuxJob {
    /// Create a job, validating structural invariants.
    ///
    /// Fails when the selection has zero or multiple video tracks,
    /// duplicate `(source_path, source_index)` pairs, or an override
    /// keyed to a track that is not selected.
    pub fn new(
        output_path: impl Into<PathBuf>,
        tracks: Vec<Track>,
        overrides: HashMap<TrackKey, TrackOverride>,
    ) -> Result<Self, InvalidJobError> {
        let video_count = tracks.iter().filter(|t| t.kind == TrackKind::Video).count();
        match video_count {
            0 => return Err(InvalidJobError::NoVideoTrack),
            1 => {}
            n => return Err(InvalidJobError::MultipleVideoTracks(n)),
        }

        let mut seen: HashSet<TrackKey> = HashSet::with_capacity(tracks.len());
        for track in &tracks {
            if !seen.insert(track.key()) {
                return Err(InvalidJobError::DuplicateTrack(track.key()));
            }
        }

        for key in overrides.keys() {
            if !seen.contains(key) {
                return Err(InvalidJobError::OrphanOverride(key.clone()));
            }
        }

        // Keep the video track first; mkvmerge track order follows the
        // selection order.
        let mut tracks = tracks;
        tracks.sort_by_key(|t| match t.kind {
            TrackKind::Video => 0,
            TrackKind::Audio => 1,
            TrackKind::Subtitles => 2,
        });

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            output_path: output_path.into(),
            tracks,
            overrides,
            created_at: Utc::now(),
        })
    }

    /// The single video track.
    pub fn video_track(&self) -> &Track {
        // Invariant from construction: exactly one video track, sorted first.
        &self.tracks[0]
    }

    /// All selected tracks, video first.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Metadata override for a track, if any.
    pub fn override_for(&self, key: &TrackKey) -> Option<&TrackOverride> {
        self.overrides.get(key)
    }

    /// Unique source files referenced by the selection.
    pub fn source_paths(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.tracks
            .iter()
            .filter(|t| seen.insert(t.source_path.clone()))
            .map(|t| t.source_path.clone())
            .collect()
    }

    /// Clone this job's configuration into a fresh job with a new id.
    ///
    /// Used to re-run a failed job without mutating its history.
    pub fn retry(&self) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            output_path: self.output_path.clone(),
            tracks: self.tracks.clone(),
            overrides: self.overrides.clone(),
            created_at: Utc::now(),
        }
    }
}
