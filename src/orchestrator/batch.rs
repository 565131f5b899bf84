//! Batch execution: job factory plus the bounded worker pool.
//!
//! The factory turns matched episode pairs into remux jobs using the
//! configured language defaults. The runner feeds jobs to a fixed set of
//! worker threads over a channel; one job failing never takes down the
//! batch, and cancellation reaches queued jobs when a worker picks them
//! up.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::matcher::{is_forced_subtitle_name, MatchReport};
use crate::models::{Episode, InvalidJobError, JobStatus, RemuxJob, Track, TrackKind, TrackOverride};
use crate::mux::MuxBackend;
use crate::probe::{ProbeError, Prober};
use crate::process::CancelToken;

use super::events::{BatchReport, JobEvent};
use super::job::{drive_job, JobHandle};

/// A job could not be built for an episode pair.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobFactoryError {
    /// Probing one of the episode's sources failed.
    #[error("probe failed for episode {episode}: {source}")]
    Probe {
        episode: u32,
        #[source]
        source: ProbeError,
    },

    /// The primary file has no video track.
    #[error("episode {episode}: primary file has no video track")]
    NoVideoTrack { episode: u32 },

    /// A source that must contribute audio has none.
    #[error("episode {episode}: {side} file has no audio track")]
    NoAudioTrack { episode: u32, side: &'static str },

    /// The assembled selection violated a job invariant.
    #[error("episode {episode}: {source}")]
    Invalid {
        episode: u32,
        #[source]
        source: InvalidJobError,
    },
}

/// Runs batches of remux jobs against pluggable prober and mux backends.
pub struct BatchRunner {
    config: EngineConfig,
    prober: Arc<dyn Prober>,
    backend: Arc<dyn MuxBackend>,
}

impl BatchRunner {
    pub fn new(config: EngineConfig, prober: Arc<dyn Prober>, backend: Arc<dyn MuxBackend>) -> Self {
        Self {
            config,
            prober,
            backend,
        }
    }

    /// Build one job per matched episode.
    ///
    /// Fails on the first episode that cannot produce a job; partial
    /// batches are a caller decision, not a silent default.
    pub fn build_jobs(
        &self,
        report: &MatchReport,
        output_dir: &Path,
    ) -> Result<Vec<RemuxJob>, JobFactoryError> {
        report
            .episodes
            .iter()
            .map(|episode| self.build_job(episode, output_dir))
            .collect()
    }

    /// Build the job for one episode pair.
    ///
    /// Selection mirrors the dual-audio layout: video and primary-language
    /// audio from the primary file, audio and subtitles from the
    /// secondary file, with the configured language defaults applied as
    /// overrides.
    pub fn build_job(
        &self,
        episode: &Episode,
        output_dir: &Path,
    ) -> Result<RemuxJob, JobFactoryError> {
        let number = episode.number;
        // Factory probes are not tied to a job lifecycle yet.
        let cancel = CancelToken::new();
        let probe = |path: &Path| {
            self.prober
                .probe(path, &cancel)
                .map_err(|source| JobFactoryError::Probe {
                    episode: number,
                    source,
                })
        };
        let primary = probe(&episode.primary_file)?;
        let secondary = probe(&episode.secondary_file)?;

        let langs = &self.config.languages;
        let mut tracks = Vec::new();
        let mut overrides = HashMap::new();

        let video = primary
            .iter()
            .find(|t| t.kind == TrackKind::Video)
            .ok_or(JobFactoryError::NoVideoTrack { episode: number })?;
        tracks.push(video.clone());

        // Primary audio: prefer the configured language, else the first
        // audio track the file has.
        let primary_audio = pick_audio(&primary, &langs.primary_audio_lang)
            .ok_or(JobFactoryError::NoAudioTrack {
                episode: number,
                side: "primary",
            })?;
        overrides.insert(
            primary_audio.key(),
            TrackOverride::language(langs.primary_audio_lang.clone())
                .with_title(langs.primary_audio_title.clone())
                .with_default(true),
        );
        tracks.push(primary_audio.clone());

        let secondary_audio = pick_audio(&secondary, &langs.secondary_lang)
            .ok_or(JobFactoryError::NoAudioTrack {
                episode: number,
                side: "secondary",
            })?;
        overrides.insert(
            secondary_audio.key(),
            TrackOverride::language(langs.secondary_lang.clone())
                .with_title(langs.secondary_audio_title.clone())
                .with_default(false),
        );
        tracks.push(secondary_audio.clone());

        let secondary_name = episode
            .secondary_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for subtitle in secondary.iter().filter(|t| t.kind == TrackKind::Subtitles) {
            let forced = subtitle.is_forced
                || subtitle
                    .title
                    .as_deref()
                    .is_some_and(is_forced_subtitle_name)
                || is_forced_subtitle_name(&secondary_name);
            let mut ov = TrackOverride::language(langs.secondary_lang.clone());
            if forced {
                ov = ov
                    .with_forced(true)
                    .with_title(langs.forced_subtitle_title.clone());
            }
            overrides.insert(subtitle.key(), ov);
            tracks.push(subtitle.clone());
        }

        let output_path = output_dir.join(self.config.batch.output_name(number));
        RemuxJob::new(output_path, tracks, overrides).map_err(|source| JobFactoryError::Invalid {
            episode: number,
            source,
        })
    }

    /// Start executing a batch on the worker pool.
    ///
    /// Returns immediately; observe progress through the handle's event
    /// channel and collect the tally with `BatchHandle::wait`.
    pub fn start(&self, jobs: Vec<RemuxJob>) -> BatchHandle {
        let handles: Vec<JobHandle> = jobs.into_iter().map(JobHandle::new).collect();

        let workers_wanted = self
            .config
            .batch
            .effective_concurrency()
            .min(handles.len())
            .max(1);

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<JobHandle>();
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<JobEvent>();
        for handle in &handles {
            // Unbounded send to a live receiver cannot fail here.
            let _ = job_tx.send(handle.clone());
        }
        drop(job_tx);

        tracing::info!(
            jobs = handles.len(),
            workers = workers_wanted,
            "starting batch"
        );

        let workers = (0..workers_wanted)
            .map(|worker_index| {
                let job_rx = job_rx.clone();
                let event_tx = event_tx.clone();
                let prober = Arc::clone(&self.prober);
                let backend = Arc::clone(&self.backend);
                thread::Builder::new()
                    .name(format!("remux-worker-{}", worker_index))
                    .spawn(move || worker_loop(job_rx, event_tx, prober, backend))
                    .expect("spawn worker thread")
            })
            .collect();

        BatchHandle {
            events: event_rx,
            handles,
            workers,
        }
    }
}

fn worker_loop(
    jobs: Receiver<JobHandle>,
    events: Sender<JobEvent>,
    prober: Arc<dyn Prober>,
    backend: Arc<dyn MuxBackend>,
) {
    while let Ok(handle) = jobs.recv() {
        drive_job(&handle, prober.as_ref(), backend.as_ref(), &events);
    }
}

fn pick_audio<'a>(tracks: &'a [Track], preferred_lang: &str) -> Option<&'a Track> {
    let audio = || tracks.iter().filter(|t| t.kind == TrackKind::Audio);
    audio()
        .find(|t| t.language == preferred_lang)
        .or_else(|| audio().next())
}

/// Live view of a running batch.
pub struct BatchHandle {
    events: Receiver<JobEvent>,
    handles: Vec<JobHandle>,
    workers: Vec<JoinHandle<()>>,
}

impl BatchHandle {
    /// Event stream for this batch. The channel closes when the last
    /// worker exits.
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// All job handles, in submission order.
    pub fn jobs(&self) -> &[JobHandle] {
        &self.handles
    }

    /// Handle for one job by id.
    pub fn job(&self, id: &str) -> Option<&JobHandle> {
        self.handles.iter().find(|h| h.id() == id)
    }

    /// Request cancellation of one job.
    pub fn cancel_job(&self, id: &str) -> bool {
        match self.job(id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Request cancellation of every job in the batch.
    pub fn cancel_all(&self) {
        tracing::warn!(jobs = self.handles.len(), "cancelling batch");
        for handle in &self.handles {
            handle.cancel();
        }
    }

    /// Equal-weight mean of per-job progress, 0..=100.
    pub fn aggregate_progress(&self) -> u8 {
        if self.handles.is_empty() {
            return 100;
        }
        let sum: u32 = self.handles.iter().map(|h| h.progress() as u32).sum();
        (sum / self.handles.len() as u32) as u8
    }

    /// Block until every job reached a terminal state and tally the run.
    pub fn wait(mut self) -> BatchReport {
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }

        let mut report = BatchReport::default();
        for handle in &self.handles {
            match handle.status() {
                JobStatus::Completed => report.succeeded += 1,
                JobStatus::Cancelled => report.cancelled += 1,
                _ => report.failed += 1,
            }
        }
        tracing::info!(%report, "batch finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use std::path::PathBuf;

    use crate::models::MatchConfidence;
    use crate::mux::{MuxExecutionError, MuxOutcome};
    use crate::plan::{MuxPlan, PlanBuilder, PlanValidationError, ProbeSet};

    struct MapProber {
        files: Map<PathBuf, Vec<Track>>,
    }

    impl MapProber {
        fn new(entries: Vec<(&str, Vec<Track>)>) -> Self {
            Self {
                files: entries
                    .into_iter()
                    .map(|(p, t)| (PathBuf::from(p), t))
                    .collect(),
            }
        }
    }

    impl Prober for MapProber {
        fn probe(&self, path: &Path, _cancel: &CancelToken) -> Result<Vec<Track>, ProbeError> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| ProbeError::FileNotFound(path.to_path_buf()))
        }
    }

    /// Backend that plans for real but fakes execution. Output paths
    /// containing "fail" fail; an optional gate blocks execution until
    /// released so tests can cancel deterministically.
    struct FakeBackend {
        gate: Option<Receiver<()>>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self { gate: None }
        }

        fn gated() -> (Self, Sender<()>) {
            let (tx, rx) = crossbeam_channel::unbounded();
            (Self { gate: Some(rx) }, tx)
        }
    }

    impl MuxBackend for FakeBackend {
        fn plan(&self, job: &RemuxJob, probes: &ProbeSet) -> Result<MuxPlan, PlanValidationError> {
            PlanBuilder::new().build(job, probes)
        }

        fn execute(
            &self,
            plan: &MuxPlan,
            on_progress: &mut dyn FnMut(u8),
            cancel: &CancelToken,
        ) -> Result<MuxOutcome, MuxExecutionError> {
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            if cancel.is_cancelled() {
                return Err(MuxExecutionError::Cancelled { confirmed: true });
            }
            if plan.output_path.to_string_lossy().contains("fail") {
                return Err(MuxExecutionError::ToolFailed {
                    exit_code: Some(2),
                    stderr_tail: "simulated failure".to_string(),
                });
            }
            on_progress(50);
            on_progress(100);
            Ok(MuxOutcome {
                output_path: plan.output_path.clone(),
                output_size_bytes: 1024,
            })
        }
    }

    fn video(path: &str) -> Track {
        Track::new(TrackKind::Video, "V_MPEG4/ISO/AVC", path, 0)
    }

    fn audio(path: &str, index: u32, lang: &str) -> Track {
        Track::new(TrackKind::Audio, "A_AAC", path, index).with_language(lang)
    }

    fn subtitle(path: &str, index: u32, forced: bool) -> Track {
        Track::new(TrackKind::Subtitles, "S_TEXT/ASS", path, index)
            .with_language("und")
            .with_forced(forced)
    }

    fn dual_source_prober(paths: &[(&str, &str)]) -> MapProber {
        let mut entries = Vec::new();
        for (primary, secondary) in paths {
            entries.push((
                *primary,
                vec![video(primary), audio(primary, 1, "jpn")],
            ));
            entries.push((
                *secondary,
                vec![
                    video(secondary),
                    audio(secondary, 1, "und"),
                    subtitle(secondary, 2, true),
                ],
            ));
        }
        MapProber::new(entries)
    }

    fn runner_with(prober: MapProber, backend: FakeBackend, limit: usize) -> BatchRunner {
        let mut config = EngineConfig::default();
        config.batch.concurrency_limit = limit;
        BatchRunner::new(config, Arc::new(prober), Arc::new(backend))
    }

    fn job_for(runner: &BatchRunner, number: u32, primary: &str, secondary: &str, out: &str) -> RemuxJob {
        let episode = Episode::new(number, primary, secondary, MatchConfidence::Exact);
        runner.build_job(&episode, Path::new(out)).unwrap()
    }

    #[test]
    fn factory_builds_dual_audio_job() {
        let prober = dual_source_prober(&[("/in/jp01.mkv", "/in/lat01.mkv")]);
        let runner = runner_with(prober, FakeBackend::new(), 1);

        let job = job_for(&runner, 1, "/in/jp01.mkv", "/in/lat01.mkv", "/out");

        assert_eq!(job.output_path, PathBuf::from("/out/Episode_01_REMUX.mkv"));
        // Video + two audio + one subtitle; the secondary video is dropped.
        let kinds: Vec<TrackKind> = job.tracks().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TrackKind::Video,
                TrackKind::Audio,
                TrackKind::Audio,
                TrackKind::Subtitles
            ]
        );
        assert_eq!(job.video_track().source_path, PathBuf::from("/in/jp01.mkv"));

        let jp_key = job.tracks()[1].key();
        let jp_ov = job.override_for(&jp_key).unwrap();
        assert_eq!(jp_ov.language.as_deref(), Some("jpn"));
        assert_eq!(jp_ov.title.as_deref(), Some("Japanese"));
        assert_eq!(jp_ov.is_default, Some(true));

        let lat_key = job.tracks()[2].key();
        let lat_ov = job.override_for(&lat_key).unwrap();
        assert_eq!(lat_ov.language.as_deref(), Some("spa"));
        assert_eq!(lat_ov.title.as_deref(), Some("Español Latino"));

        let sub_key = job.tracks()[3].key();
        let sub_ov = job.override_for(&sub_key).unwrap();
        assert_eq!(sub_ov.is_forced, Some(true));
        assert_eq!(sub_ov.title.as_deref(), Some("Letreros"));
    }

    #[test]
    fn factory_rejects_audioless_secondary() {
        let prober = MapProber::new(vec![
            ("/in/jp.mkv", vec![video("/in/jp.mkv"), audio("/in/jp.mkv", 1, "jpn")]),
            ("/in/lat.mkv", vec![video("/in/lat.mkv")]),
        ]);
        let runner = runner_with(prober, FakeBackend::new(), 1);

        let episode = Episode::new(4, "/in/jp.mkv", "/in/lat.mkv", MatchConfidence::Exact);
        let err = runner.build_job(&episode, Path::new("/out")).unwrap_err();
        assert_eq!(
            err,
            JobFactoryError::NoAudioTrack {
                episode: 4,
                side: "secondary"
            }
        );
    }

    #[test]
    fn batch_runs_all_jobs_to_completion() {
        let prober = dual_source_prober(&[
            ("/in/jp01.mkv", "/in/lat01.mkv"),
            ("/in/jp02.mkv", "/in/lat02.mkv"),
            ("/in/jp03.mkv", "/in/lat03.mkv"),
        ]);
        let runner = runner_with(prober, FakeBackend::new(), 2);

        let jobs = vec![
            job_for(&runner, 1, "/in/jp01.mkv", "/in/lat01.mkv", "/out"),
            job_for(&runner, 2, "/in/jp02.mkv", "/in/lat02.mkv", "/out"),
            job_for(&runner, 3, "/in/jp03.mkv", "/in/lat03.mkv", "/out"),
        ];

        let handle = runner.start(jobs);
        let report = handle.wait();

        assert_eq!(
            report,
            BatchReport {
                succeeded: 3,
                failed: 0,
                cancelled: 0
            }
        );
    }

    #[test]
    fn failing_job_does_not_stop_the_batch() {
        let prober = dual_source_prober(&[
            ("/in/jp01.mkv", "/in/lat01.mkv"),
            ("/in/jp02.mkv", "/in/lat02.mkv"),
        ]);
        let runner = runner_with(prober, FakeBackend::new(), 1);

        let good = job_for(&runner, 1, "/in/jp01.mkv", "/in/lat01.mkv", "/out");
        let bad = job_for(&runner, 2, "/in/jp02.mkv", "/in/lat02.mkv", "/out-fail");

        let handle = runner.start(vec![bad, good]);
        let report = handle.wait();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn failed_job_carries_error_detail() {
        let prober = dual_source_prober(&[("/in/jp01.mkv", "/in/lat01.mkv")]);
        let runner = runner_with(prober, FakeBackend::new(), 1);
        let job = job_for(&runner, 1, "/in/jp01.mkv", "/in/lat01.mkv", "/out-fail");
        let id = job.id.clone();

        let handle = runner.start(vec![job]);
        let events = handle.events().clone();
        let report = handle.wait();
        assert_eq!(report.failed, 1);

        let detail = events
            .try_iter()
            .find_map(|e| match e {
                JobEvent::Finished { job_id, error, .. } if job_id == id => error,
                _ => None,
            })
            .unwrap();
        assert!(detail.contains("simulated failure"));
    }

    #[test]
    fn probe_failure_fails_only_that_job() {
        // lat02 is not registered with the prober, so job 2's re-probe fails.
        let mut prober = dual_source_prober(&[("/in/jp01.mkv", "/in/lat01.mkv")]);
        prober.files.insert(
            PathBuf::from("/in/jp02.mkv"),
            vec![video("/in/jp02.mkv"), audio("/in/jp02.mkv", 1, "jpn")],
        );

        let tracks2 = vec![
            video("/in/jp02.mkv"),
            audio("/in/jp02.mkv", 1, "jpn"),
            audio("/in/lat02.mkv", 0, "spa"),
        ];
        let job2 = RemuxJob::new("/out/Episode_02_REMUX.mkv", tracks2, Map::new()).unwrap();
        let job2_id = job2.id.clone();

        let runner = runner_with(prober, FakeBackend::new(), 1);
        let job1 = job_for(&runner, 1, "/in/jp01.mkv", "/in/lat01.mkv", "/out");

        let handle = runner.start(vec![job2, job1]);
        let failed_error = loop {
            match handle.events().recv().unwrap() {
                JobEvent::Finished {
                    job_id,
                    status: JobStatus::Failed,
                    error,
                } if job_id == job2_id => break error,
                _ => continue,
            }
        };
        let report = handle.wait();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(failed_error.unwrap().contains("file not found"));
    }

    #[test]
    fn cancel_all_reaches_running_and_queued_jobs() {
        let prober = dual_source_prober(&[
            ("/in/jp01.mkv", "/in/lat01.mkv"),
            ("/in/jp02.mkv", "/in/lat02.mkv"),
        ]);
        let (backend, release) = FakeBackend::gated();
        let runner = runner_with(prober, backend, 1);

        let jobs = vec![
            job_for(&runner, 1, "/in/jp01.mkv", "/in/lat01.mkv", "/out"),
            job_for(&runner, 2, "/in/jp02.mkv", "/in/lat02.mkv", "/out"),
        ];

        let handle = runner.start(jobs);
        // Wait for job 1 to reach Executing (it then blocks on the gate).
        loop {
            if let JobEvent::StatusChanged {
                status: JobStatus::Executing,
                ..
            } = handle.events().recv().unwrap()
            {
                break;
            }
        }

        handle.cancel_all();
        release.send(()).unwrap();
        release.send(()).unwrap();

        let report = handle.wait();
        assert_eq!(
            report,
            BatchReport {
                succeeded: 0,
                failed: 0,
                cancelled: 2
            }
        );
    }

    #[test]
    fn cancel_job_targets_one_job() {
        let prober = dual_source_prober(&[("/in/jp01.mkv", "/in/lat01.mkv")]);
        let runner = runner_with(prober, FakeBackend::new(), 1);
        let job = job_for(&runner, 1, "/in/jp01.mkv", "/in/lat01.mkv", "/out");
        let id = job.id.clone();

        let handle = runner.start(Vec::new());
        assert!(!handle.cancel_job(&id));
        assert_eq!(handle.aggregate_progress(), 100);
        let report = handle.wait();
        assert_eq!(report.total(), 0);
        drop(job);
    }

    #[test]
    fn lifecycle_events_arrive_in_order() {
        let prober = dual_source_prober(&[("/in/jp01.mkv", "/in/lat01.mkv")]);
        let runner = runner_with(prober, FakeBackend::new(), 1);
        let job = job_for(&runner, 1, "/in/jp01.mkv", "/in/lat01.mkv", "/out");
        let id = job.id.clone();

        let handle = runner.start(vec![job]);
        let events = handle.events().clone();
        let job_handle = handle.job(&id).unwrap().clone();
        let report = handle.wait();
        assert!(report.is_clean());

        assert_eq!(job_handle.status(), JobStatus::Completed);
        assert_eq!(job_handle.progress(), 100);

        let statuses: Vec<JobStatus> = events
            .try_iter()
            .filter_map(|e| match e {
                JobEvent::StatusChanged { job_id, status } if job_id == id => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Probing,
                JobStatus::Planning,
                JobStatus::Executing,
                JobStatus::Completed
            ]
        );
    }
}
