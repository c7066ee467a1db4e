//! Asynchronous video analysis jobs
//!
//! `submit` records a queued job and hands it to a fixed-size worker pool;
//! the caller never waits for analysis. Each job samples its video, runs the
//! shared [`FrameAnalysisPipeline`] over every sampled frame, and writes its
//! terminal state exactly once. Jobs are never retried, cancelled or evicted.

pub mod job;
pub mod store;

use std::num::NonZeroU32;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use video_emotion_common::panic_message;
use video_emotion_decoder::{sample, DecodeError, VideoSource};
use video_emotion_pipeline::{FrameAnalysisPipeline, VideoAnalysisResult};

pub use job::{FailureKind, Job, JobFailure, JobId, JobState, JobStatus};
pub use store::JobStore;

pub const WORKERS_ENV: &str = "EMOTION_WORKERS";
pub const INTERVAL_ENV: &str = "EMOTION_FRAME_INTERVAL";

/// Sampling interval used when a submission does not name one
pub const DEFAULT_FRAME_INTERVAL: u32 = 10;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Frame interval must be at least 1, got {0}")]
    InvalidInterval(u32),

    #[error("Invalid {name}: '{value}'")]
    InvalidSetting { name: &'static str, value: String },

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Worker pool and sampling defaults
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Jobs analyzed in parallel
    pub workers: usize,
    pub default_interval: NonZeroU32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            default_interval: NonZeroU32::new(DEFAULT_FRAME_INTERVAL).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl OrchestratorConfig {
    /// Defaults overridden by `EMOTION_WORKERS` and `EMOTION_FRAME_INTERVAL`
    ///
    /// # Errors
    ///
    /// Fails when either variable is set but not a positive integer.
    pub fn from_env() -> Result<Self, OrchestratorError> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var(WORKERS_ENV) {
            config.workers = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .ok_or(OrchestratorError::InvalidSetting {
                    name: WORKERS_ENV,
                    value,
                })?;
        }
        if let Ok(value) = std::env::var(INTERVAL_ENV) {
            config.default_interval = value
                .trim()
                .parse::<NonZeroU32>()
                .map_err(|_| OrchestratorError::InvalidSetting {
                    name: INTERVAL_ENV,
                    value,
                })?;
        }

        Ok(config)
    }
}

/// Accepts analysis jobs and tracks their status
pub struct JobOrchestrator {
    pipeline: FrameAnalysisPipeline,
    source: Arc<dyn VideoSource>,
    pool: rayon::ThreadPool,
    store: Arc<JobStore>,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    /// Start the worker pool
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::WorkerPool`] if the threads cannot be spawned.
    pub fn new(
        pipeline: FrameAnalysisPipeline,
        source: Arc<dyn VideoSource>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        let workers = config.workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("emotion-worker-{i}"))
            .build()
            .map_err(|e| OrchestratorError::WorkerPool(e.to_string()))?;

        info!(
            "Job orchestrator ready ({} workers, default interval {})",
            workers, config.default_interval
        );

        Ok(Self {
            pipeline,
            source,
            pool,
            store: Arc::new(JobStore::new()),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Queue `video` for analysis and return its id immediately.
    ///
    /// `interval` defaults to the configured interval when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidInterval`] for an interval of 0.
    pub fn submit(
        &self,
        video: impl Into<PathBuf>,
        interval: Option<u32>,
    ) -> Result<JobId, OrchestratorError> {
        let interval = match interval {
            Some(n) => NonZeroU32::new(n).ok_or(OrchestratorError::InvalidInterval(n))?,
            None => self.config.default_interval,
        };
        let video = video.into();
        let id = JobId::generate();

        self.store
            .insert(Job::queued(id.clone(), video.clone(), interval.get()));
        info!(
            "Job {} submitted: {} (interval {})",
            id,
            video.display(),
            interval
        );

        let pipeline = self.pipeline.clone();
        let source = Arc::clone(&self.source);
        let store = Arc::clone(&self.store);
        let job_id = id.clone();
        self.pool.spawn(move || {
            let state = run_job(&pipeline, source.as_ref(), &video, interval, &job_id);
            store.finish(&job_id, state);
        });

        Ok(id)
    }

    /// Snapshot of a job, or `None` if `id` was never submitted
    #[must_use]
    pub fn get_status(&self, id: &str) -> Option<Job> {
        self.store.get(id)
    }

    /// Number of tracked jobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

/// Job body. Never panics; every failure becomes a [`JobState::Error`].
fn run_job(
    pipeline: &FrameAnalysisPipeline,
    source: &dyn VideoSource,
    video: &Path,
    interval: NonZeroU32,
    id: &JobId,
) -> JobState {
    debug!("Job {} started", id);

    let outcome = catch_unwind(AssertUnwindSafe(
        || -> Result<VideoAnalysisResult, JobFailure> {
            let unavailable = |e: DecodeError| JobFailure {
                error: e.to_string(),
                kind: FailureKind::SourceUnavailable,
            };
            let mut frames = sample(source, video, interval).map_err(unavailable)?;
            let result = pipeline.analyze_many(frames.by_ref());
            // A stream cut short by corruption fails the whole job
            match frames.take_error() {
                Some(e) => Err(unavailable(e)),
                None => Ok(result),
            }
        },
    ));

    match outcome {
        Ok(Ok(result)) => {
            info!("Job {} done: {} frames analyzed", id, result.len());
            JobState::Done(Arc::new(result))
        }
        Ok(Err(failure)) => {
            warn!("Job {} failed: {}", id, failure.error);
            JobState::Error(failure)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("Job {} panicked: {}", id, message);
            JobState::Error(JobFailure {
                error: message,
                kind: FailureKind::Internal,
            })
        }
    }
}
