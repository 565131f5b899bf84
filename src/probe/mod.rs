//! File probing via mkvmerge -J.
//!
//! Turns a media file path into the list of tracks it contains. Pure
//! from the engine's perspective: path in, tracks or a `ProbeError` out.
//! Failures are surfaced to the caller for an explicit decision; the
//! adapter never retries on its own.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::models::{Track, TrackKind};
use crate::process::{self, CancelToken, RunStatus};

/// Probing failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    /// Input file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// The container is not recognized by the tool.
    #[error("unreadable container: {0}")]
    UnreadableContainer(PathBuf),

    /// The probing tool is not installed or not on PATH.
    #[error("probing tool not found: {0}")]
    ExternalToolMissing(PathBuf),

    /// The tool ran but failed, timed out, or produced unparseable
    /// output. Timeout is reported here, not as a cancellation.
    #[error("probe failed (exit code {exit_code:?}): {stderr_excerpt}")]
    ExternalToolFailed {
        exit_code: Option<i32>,
        stderr_excerpt: String,
    },

    /// The run was cancelled while the tool was still working.
    #[error("probe cancelled")]
    Cancelled,
}

impl ProbeError {
    fn tool_failed(exit_code: Option<i32>, detail: impl Into<String>) -> Self {
        Self::ExternalToolFailed {
            exit_code,
            stderr_excerpt: detail.into(),
        }
    }
}

/// Track enumeration for a media file.
pub trait Prober: Send + Sync {
    /// Enumerate the tracks of `path`.
    ///
    /// `cancel` terminates an in-flight probe; a cancelled run returns
    /// `ProbeError::Cancelled` rather than waiting out the probe timeout.
    fn probe(&self, path: &Path, cancel: &CancelToken) -> Result<Vec<Track>, ProbeError>;
}

/// Prober backed by `mkvmerge -J`.
#[derive(Debug, Clone)]
pub struct MkvmergeProber {
    mkvmerge: PathBuf,
    timeout: std::time::Duration,
    grace: std::time::Duration,
}

impl MkvmergeProber {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            mkvmerge: config.tools.mkvmerge.clone(),
            timeout: config.timeouts.probe(),
            grace: config.timeouts.cancel_grace(),
        }
    }
}

impl Prober for MkvmergeProber {
    fn probe(&self, path: &Path, cancel: &CancelToken) -> Result<Vec<Track>, ProbeError> {
        if !path.exists() {
            return Err(ProbeError::FileNotFound(path.to_path_buf()));
        }

        tracing::debug!(file = %path.display(), "probing");

        let args = vec!["-J".to_string(), path.to_string_lossy().into_owned()];
        let outcome = process::run_command(
            &self.mkvmerge,
            &args,
            self.timeout,
            self.grace,
            Some(cancel),
            |_| {},
        )
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProbeError::ExternalToolMissing(self.mkvmerge.clone())
            } else {
                ProbeError::tool_failed(None, e.to_string())
            }
        })?;

        match outcome.status {
            RunStatus::Cancelled { .. } => return Err(ProbeError::Cancelled),
            RunStatus::TimedOut => {
                return Err(ProbeError::tool_failed(
                    None,
                    format!("probe timed out after {:?}", self.timeout),
                ));
            }
            RunStatus::Exited => {}
        }
        if !outcome.success() {
            return Err(ProbeError::tool_failed(
                outcome.exit_code,
                process::tail_lines(&outcome.stderr, 20),
            ));
        }

        parse_probe_output(&outcome.stdout, path)
    }
}

/// Parse mkvmerge -J output into tracks.
///
/// Unparseable output is a tool failure, never an empty track list.
pub fn parse_probe_output(stdout: &str, path: &Path) -> Result<Vec<Track>, ProbeError> {
    let json: Value = serde_json::from_str(stdout)
        .map_err(|e| ProbeError::tool_failed(Some(0), format!("unparseable probe output: {}", e)))?;

    let recognized = json
        .pointer("/container/recognized")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !recognized {
        return Err(ProbeError::UnreadableContainer(path.to_path_buf()));
    }

    let raw_tracks = json
        .get("tracks")
        .and_then(Value::as_array)
        .ok_or_else(|| ProbeError::tool_failed(Some(0), "probe output has no track list"))?;

    let mut tracks = Vec::with_capacity(raw_tracks.len());
    for raw in raw_tracks {
        if let Some(track) = parse_track(raw, path) {
            tracks.push(track);
        }
    }

    tracing::debug!(file = %path.display(), tracks = tracks.len(), "probe finished");
    Ok(tracks)
}

fn parse_track(raw: &Value, path: &Path) -> Option<Track> {
    let kind = TrackKind::from_probe_str(raw.get("type")?.as_str()?)?;
    let source_index = raw.get("id")?.as_u64()? as u32;

    let props = raw.get("properties");
    let codec = props
        .and_then(|p| p.get("codec_id"))
        .and_then(Value::as_str)
        .or_else(|| raw.get("codec").and_then(Value::as_str))
        .unwrap_or("")
        .to_string();

    let mut track = Track::new(kind, codec, path, source_index);

    if let Some(p) = props {
        // Track-level duration only; the container duration is not a
        // property of any single stream.
        track.duration_secs = p
            .get("duration")
            .and_then(Value::as_u64)
            .map(|ns| ns as f64 / 1_000_000_000.0);
        if let Some(lang) = p.get("language").and_then(Value::as_str) {
            track.language = lang.to_string();
        }
        if let Some(name) = p.get("track_name").and_then(Value::as_str) {
            track.title = Some(name.to_string());
        }
        track.is_default = p
            .get("default_track")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        track.is_forced = p
            .get("forced_track")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    }

    Some(track)
}
