//! Engine configuration.
//!
//! Everything the orchestrator needs is passed in explicitly at
//! construction: tool paths, timeouts, concurrency limit, and language
//! defaults. There are no ambient singletons; front-ends own persistence
//! and hand the engine a ready `EngineConfig`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the remux engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// External tool locations.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Timeouts and termination grace.
    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Batch execution settings.
    #[serde(default)]
    pub batch: BatchSettings,

    /// Language and title defaults for batch-built jobs.
    #[serde(default)]
    pub languages: LanguageSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tools: ToolSettings::default(),
            timeouts: TimeoutSettings::default(),
            batch: BatchSettings::default(),
            languages: LanguageSettings::default(),
        }
    }
}

/// Paths to the external collaborators.
///
/// A bare executable name means "resolve via PATH".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// mkvmerge executable (both prober and muxer).
    #[serde(default = "default_mkvmerge")]
    pub mkvmerge: PathBuf,
}

fn default_mkvmerge() -> PathBuf {
    PathBuf::from("mkvmerge")
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            mkvmerge: default_mkvmerge(),
        }
    }
}

/// Timeouts for external process calls.
///
/// Probe and mux timeouts are independent; exceeding either is reported
/// as a tool failure, not a cancellation. `cancel_grace` bounds how long
/// a cancelled job waits for its child process to die before the runner
/// force-kills it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Maximum wall time for one probe invocation, in seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_secs: u64,

    /// Maximum wall time for one mux invocation, in seconds.
    #[serde(default = "default_mux_timeout_secs")]
    pub mux_secs: u64,

    /// Grace period after a termination request, in milliseconds.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
}

fn default_probe_timeout_secs() -> u64 {
    30
}

fn default_mux_timeout_secs() -> u64 {
    3600
}

fn default_cancel_grace_ms() -> u64 {
    3000
}

impl TimeoutSettings {
    /// Probe timeout as a `Duration`.
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    /// Mux timeout as a `Duration`.
    pub fn mux(&self) -> Duration {
        Duration::from_secs(self.mux_secs)
    }

    /// Cancellation grace period as a `Duration`.
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            probe_secs: default_probe_timeout_secs(),
            mux_secs: default_mux_timeout_secs(),
            cancel_grace_ms: default_cancel_grace_ms(),
        }
    }
}

/// Batch execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Maximum jobs running concurrently. Zero means "processor count".
    ///
    /// Each job spawns an external process, so this is never unbounded.
    #[serde(default)]
    pub concurrency_limit: usize,

    /// Output filename pattern. `{ep}` is replaced with the zero-padded
    /// episode number.
    #[serde(default = "default_output_pattern")]
    pub output_pattern: String,
}

fn default_output_pattern() -> String {
    "Episode_{ep}_REMUX.mkv".to_string()
}

impl BatchSettings {
    /// Effective concurrency limit (resolves zero to the processor count).
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency_limit == 0 {
            num_cpus::get().max(1)
        } else {
            self.concurrency_limit
        }
    }

    /// Render the output filename for an episode number.
    pub fn output_name(&self, episode: u32) -> String {
        self.output_pattern
            .replace("{ep}", &format!("{:02}", episode))
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 0,
            output_pattern: default_output_pattern(),
        }
    }
}

/// Language and title defaults applied by the batch job factory.
///
/// Codes are ISO 639-2 as mkvmerge expects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageSettings {
    /// Language of audio kept from the primary source.
    #[serde(default = "default_primary_lang")]
    pub primary_audio_lang: String,

    /// Title for the primary audio track.
    #[serde(default = "default_primary_title")]
    pub primary_audio_title: String,

    /// Language of audio/subtitles taken from the secondary source.
    #[serde(default = "default_secondary_lang")]
    pub secondary_lang: String,

    /// Title for secondary audio tracks.
    #[serde(default = "default_secondary_audio_title")]
    pub secondary_audio_title: String,

    /// Title for forced (signs/songs) subtitle tracks.
    #[serde(default = "default_forced_sub_title")]
    pub forced_subtitle_title: String,
}

fn default_primary_lang() -> String {
    "jpn".to_string()
}

fn default_primary_title() -> String {
    "Japanese".to_string()
}

fn default_secondary_lang() -> String {
    "spa".to_string()
}

fn default_secondary_audio_title() -> String {
    "Español Latino".to_string()
}

fn default_forced_sub_title() -> String {
    "Letreros".to_string()
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            primary_audio_lang: default_primary_lang(),
            primary_audio_title: default_primary_title(),
            secondary_lang: default_secondary_lang(),
            secondary_audio_title: default_secondary_audio_title(),
            forced_subtitle_title: default_forced_sub_title(),
        }
    }
}
