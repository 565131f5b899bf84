//! Plan builder: resolves track metadata and validates a job against
//! fresh probe results before anything reaches the external tool.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{RemuxJob, Track, TrackKey, TrackKind};

use super::{MuxInstruction, MuxPlan};

/// Language codes accepted for track metadata (ISO 639-2).
///
/// An invalid code fails the plan loudly instead of being passed through
/// to the external tool.
pub const ACCEPTED_LANGUAGES: &[&str] = &[
    "und", "jpn", "spa", "eng", "por", "fre", "ger", "ita", "chi", "kor", "rus", "ara", "dut",
    "pol", "tur", "vie", "tha", "hin", "heb", "gre", "cze", "hun", "swe", "nor", "dan", "fin",
    "ukr", "ind", "may", "lat",
];

/// The plan could not be built from this job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanValidationError {
    /// The job references no video track (defense in depth; job
    /// construction already rejects this).
    #[error("plan has no base video track")]
    MissingBaseVideo,

    /// A selected track's source file was never probed.
    #[error("source was not probed: {0}")]
    UnprobedSource(PathBuf),

    /// A selected track does not exist in the probe result for its
    /// source (stale selection).
    #[error("track {key} ({kind}) not present in probe result")]
    UnknownTrack { key: TrackKey, kind: TrackKind },

    /// A resolved language code is outside the accepted set.
    #[error("invalid language code '{code}' for track {key}")]
    InvalidLanguage { key: TrackKey, code: String },
}

/// Probe results for the sources a job references.
#[derive(Debug, Clone, Default)]
pub struct ProbeSet {
    tracks: HashMap<PathBuf, Vec<Track>>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the probe result for one source file.
    pub fn insert(&mut self, path: impl Into<PathBuf>, tracks: Vec<Track>) {
        self.tracks.insert(path.into(), tracks);
    }

    /// Probe result for a source, if probed.
    pub fn get(&self, path: &Path) -> Option<&[Track]> {
        self.tracks.get(path).map(Vec::as_slice)
    }

    /// Find a probed track by identity and kind.
    pub fn find(&self, path: &Path, index: u32, kind: TrackKind) -> Option<&Track> {
        self.get(path)?
            .iter()
            .find(|t| t.source_index == index && t.kind == kind)
    }
}

/// Per-kind metadata defaults for a processing mode.
///
/// Batch mode registers defaults for external tracks; single-file mode
/// typically registers none and relies on overrides plus probed values.
#[derive(Debug, Clone, Default)]
pub struct ModeDefaults {
    languages: HashMap<TrackKind, String>,
    titles: HashMap<TrackKind, String>,
}

impl ModeDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default language for tracks of a kind.
    pub fn with_language(mut self, kind: TrackKind, lang: impl Into<String>) -> Self {
        self.languages.insert(kind, lang.into());
        self
    }

    /// Default title for tracks of a kind.
    pub fn with_title(mut self, kind: TrackKind, title: impl Into<String>) -> Self {
        self.titles.insert(kind, title.into());
        self
    }
}

/// Builds a validated `MuxPlan` from a `RemuxJob`.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    defaults: ModeDefaults,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use per-mode metadata defaults.
    pub fn with_defaults(mut self, defaults: ModeDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Build the plan.
    ///
    /// Every selected track must reference a source present in `probes`
    /// and a stream that the probe actually reported; metadata resolves
    /// as explicit override, else mode default, else probed value.
    pub fn build(&self, job: &RemuxJob, probes: &ProbeSet) -> Result<MuxPlan, PlanValidationError> {
        if !job.tracks().iter().any(|t| t.kind == TrackKind::Video) {
            return Err(PlanValidationError::MissingBaseVideo);
        }

        let mut instructions = Vec::with_capacity(job.tracks().len());
        for selected in job.tracks() {
            let key = selected.key();

            if probes.get(&selected.source_path).is_none() {
                return Err(PlanValidationError::UnprobedSource(
                    selected.source_path.clone(),
                ));
            }
            let probed = probes
                .find(&selected.source_path, selected.source_index, selected.kind)
                .ok_or_else(|| PlanValidationError::UnknownTrack {
                    key: key.clone(),
                    kind: selected.kind,
                })?;

            let overrides = job.override_for(&key);

            let language = overrides
                .and_then(|o| o.language.clone())
                .or_else(|| self.defaults.languages.get(&selected.kind).cloned())
                .unwrap_or_else(|| probed.language.clone());
            if !ACCEPTED_LANGUAGES.contains(&language.as_str()) {
                return Err(PlanValidationError::InvalidLanguage {
                    key,
                    code: language,
                });
            }

            let title = overrides
                .and_then(|o| o.title.clone())
                .or_else(|| self.defaults.titles.get(&selected.kind).cloned())
                .or_else(|| probed.title.clone());

            instructions.push(MuxInstruction {
                source_path: selected.source_path.clone(),
                source_index: selected.source_index,
                kind: selected.kind,
                language,
                title,
                is_default: overrides
                    .and_then(|o| o.is_default)
                    .unwrap_or(probed.is_default),
                is_forced: overrides
                    .and_then(|o| o.is_forced)
                    .unwrap_or(probed.is_forced),
                sync_offset_ms: overrides.and_then(|o| o.sync_offset_ms).unwrap_or(0),
            });
        }

        tracing::debug!(job = %job.id, tracks = instructions.len(), "plan built");

        Ok(MuxPlan {
            job_id: job.id.clone(),
            output_path: job.output_path.clone(),
            instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackOverride;
    use std::collections::HashMap as Map;

    fn video() -> Track {
        Track::new(TrackKind::Video, "V_MPEG4/ISO/AVC", "/src/jp.mkv", 0)
    }

    fn audio(index: u32) -> Track {
        Track::new(TrackKind::Audio, "A_AAC", "/src/lat.mka", index).with_language("und")
    }

    fn probes_for(job_tracks: &[Track]) -> ProbeSet {
        let mut probes = ProbeSet::new();
        let mut by_path: Map<PathBuf, Vec<Track>> = Map::new();
        for t in job_tracks {
            by_path.entry(t.source_path.clone()).or_default().push(t.clone());
        }
        for (path, tracks) in by_path {
            probes.insert(path, tracks);
        }
        probes
    }

    #[test]
    fn resolves_override_over_default_over_probed() {
        let tracks = vec![video(), audio(0), audio(1)];
        let probes = probes_for(&tracks);

        let mut overrides = Map::new();
        overrides.insert(
            TrackKey::new("/src/lat.mka", 0),
            TrackOverride::language("por").with_title("Dublado"),
        );
        let job = RemuxJob::new("/out/e.mkv", tracks, overrides).unwrap();

        let builder = PlanBuilder::new().with_defaults(
            ModeDefaults::new()
                .with_language(TrackKind::Audio, "spa")
                .with_title(TrackKind::Audio, "Español Latino"),
        );
        let plan = builder.build(&job, &probes).unwrap();

        // Video keeps probed metadata.
        assert_eq!(plan.instructions[0].language, "und");
        // Audio 0 has an explicit override.
        let a0 = &plan.instructions[1];
        assert_eq!((a0.language.as_str(), a0.title.as_deref()), ("por", Some("Dublado")));
        // Audio 1 falls back to the mode default.
        let a1 = &plan.instructions[2];
        assert_eq!(
            (a1.language.as_str(), a1.title.as_deref()),
            ("spa", Some("Español Latino"))
        );
    }

    #[test]
    fn rejects_unprobed_source() {
        let tracks = vec![video(), audio(0)];
        let mut probes = ProbeSet::new();
        probes.insert("/src/jp.mkv", vec![video()]);

        let job = RemuxJob::new("/out/e.mkv", tracks, Map::new()).unwrap();
        let err = PlanBuilder::new().build(&job, &probes).unwrap_err();
        assert_eq!(
            err,
            PlanValidationError::UnprobedSource(PathBuf::from("/src/lat.mka"))
        );
    }

    #[test]
    fn rejects_stale_track_index() {
        let tracks = vec![video(), audio(7)];
        let mut probes = ProbeSet::new();
        probes.insert("/src/jp.mkv", vec![video()]);
        // The probe of lat.mka only reports stream 0.
        probes.insert("/src/lat.mka", vec![audio(0)]);

        let job = RemuxJob::new("/out/e.mkv", tracks, Map::new()).unwrap();
        let err = PlanBuilder::new().build(&job, &probes).unwrap_err();
        assert!(matches!(err, PlanValidationError::UnknownTrack { .. }));
    }

    #[test]
    fn rejects_invalid_language_code() {
        let tracks = vec![video(), audio(0)];
        let probes = probes_for(&tracks);

        let mut overrides = Map::new();
        overrides.insert(
            TrackKey::new("/src/lat.mka", 0),
            TrackOverride::language("klingon"),
        );
        let job = RemuxJob::new("/out/e.mkv", tracks, overrides).unwrap();

        let err = PlanBuilder::new().build(&job, &probes).unwrap_err();
        assert!(matches!(err, PlanValidationError::InvalidLanguage { code, .. } if code == "klingon"));
    }

    #[test]
    fn plan_preserves_track_order_video_first() {
        let tracks = vec![audio(0), video()];
        let probes = probes_for(&tracks);
        let job = RemuxJob::new("/out/e.mkv", tracks, Map::new()).unwrap();

        let plan = PlanBuilder::new().build(&job, &probes).unwrap();
        assert_eq!(plan.instructions[0].kind, TrackKind::Video);
        assert_eq!(plan.instructions[1].kind, TrackKind::Audio);
    }

    #[test]
    fn sync_offset_carried_from_override() {
        let tracks = vec![video(), audio(0)];
        let probes = probes_for(&tracks);
        let mut overrides = Map::new();
        overrides.insert(
            TrackKey::new("/src/lat.mka", 0),
            TrackOverride::language("spa").with_sync_offset(-150),
        );
        let job = RemuxJob::new("/out/e.mkv", tracks, overrides).unwrap();

        let plan = PlanBuilder::new().build(&job, &probes).unwrap();
        assert_eq!(plan.instructions[1].sync_offset_ms, -150);
    }
}
