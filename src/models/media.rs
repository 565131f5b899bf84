//! Media track descriptors and per-track metadata overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::enums::TrackKind;

/// One elementary stream within a source file, as reported by the prober
/// or declared for an external single-track file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Type of stream.
    pub kind: TrackKind,
    /// Codec identifier (e.g. "V_MPEG4/ISO/AVC", "A_AAC", "S_TEXT/ASS").
    pub codec: String,
    /// File the stream lives in.
    pub source_path: PathBuf,
    /// Stream index within the source file (mkvmerge numbering).
    pub source_index: u32,
    /// ISO 639-2 language code ("und" when unknown).
    #[serde(default = "default_lang")]
    pub language: String,
    /// Track name/title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Default-track flag.
    #[serde(default)]
    pub is_default: bool,
    /// Forced-display flag (signs/songs subtitles).
    #[serde(default)]
    pub is_forced: bool,
    /// Duration in seconds, when the prober reports one for this track.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

fn default_lang() -> String {
    "und".to_string()
}

impl Track {
    /// Create a track with required fields; metadata defaults to unknown.
    pub fn new(kind: TrackKind, codec: impl Into<String>, source_path: impl Into<PathBuf>, source_index: u32) -> Self {
        Self {
            kind,
            codec: codec.into(),
            source_path: source_path.into(),
            source_index,
            language: default_lang(),
            title: None,
            is_default: false,
            is_forced: false,
            duration_secs: None,
        }
    }

    /// Set the language code.
    pub fn with_language(mut self, lang: impl Into<String>) -> Self {
        self.language = lang.into();
        self
    }

    /// Set the track title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the default-track flag.
    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Set the forced-display flag.
    pub fn with_forced(mut self, is_forced: bool) -> Self {
        self.is_forced = is_forced;
        self
    }

    /// Identity of this track within a job.
    pub fn key(&self) -> TrackKey {
        TrackKey {
            source_path: self.source_path.clone(),
            source_index: self.source_index,
        }
    }

    /// Short display string for logs and track lists.
    pub fn display_name(&self) -> String {
        let title_part = self
            .title
            .as_ref()
            .map(|t| format!(" - {}", t))
            .unwrap_or_default();
        format!(
            "{} #{} ({}){}",
            self.kind, self.source_index, self.language, title_part
        )
    }
}

/// Identity of a track: source file plus stream index.
///
/// Unique per `(source_path, kind)` group as reported by the prober; the
/// job-level invariant is uniqueness across the whole selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackKey {
    pub source_path: PathBuf,
    pub source_index: u32,
}

impl TrackKey {
    pub fn new(source_path: impl Into<PathBuf>, source_index: u32) -> Self {
        Self {
            source_path: source_path.into(),
            source_index,
        }
    }
}

impl std::fmt::Display for TrackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source_path.display(), self.source_index)
    }
}

/// Metadata overrides applied to one selected track at plan time.
///
/// `None` fields fall through to the batch-mode default, then to the
/// prober-reported value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackOverride {
    /// Language code override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Title override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Default-track flag override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    /// Forced-display flag override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_forced: Option<bool>,
    /// Sync offset in milliseconds applied via `--sync`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_offset_ms: Option<i64>,
}

impl TrackOverride {
    /// Override language only.
    pub fn language(lang: impl Into<String>) -> Self {
        Self {
            language: Some(lang.into()),
            ..Default::default()
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the default-track flag.
    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = Some(is_default);
        self
    }

    /// Set the forced-display flag.
    pub fn with_forced(mut self, is_forced: bool) -> Self {
        self.is_forced = Some(is_forced);
        self
    }

    /// Set the sync offset.
    pub fn with_sync_offset(mut self, offset_ms: i64) -> Self {
        self.sync_offset_ms = Some(offset_ms);
        self
    }
}
