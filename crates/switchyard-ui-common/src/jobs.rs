//! Background job tracking with progress channels.
//!
//! The [`JobTracker`] manages simulation runs, providing progress updates via
//! tokio channels and a [`CancellationToken`] per job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use switchyard_core::{CancellationToken, RunReport};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::{JobEvent, RunKind};

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Progress of a running job. Runs have no known length, so progress is a tick count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progress {
    pub tick: u64,
    pub message: Option<String>,
}

impl Progress {
    pub fn with_message(tick: u64, message: impl Into<String>) -> Self {
        Self {
            tick,
            message: Some(message.into()),
        }
    }

    pub fn at(tick: u64) -> Self {
        Self {
            tick,
            message: None,
        }
    }
}

/// Handle to a running job.
pub struct JobHandle {
    /// Unique job identifier.
    pub id: JobId,

    /// Receiver for progress updates.
    pub progress: watch::Receiver<Progress>,

    /// Receiver for the final result.
    pub result: oneshot::Receiver<JobResult>,
}

/// Result of a completed job.
#[derive(Debug, Clone)]
pub enum JobResult {
    /// Job completed successfully.
    Success {
        kind: RunKind,
        message: Option<String>,
        report: Option<RunReport>,
    },

    /// Job failed with an error.
    Failed { error: String },

    /// Job was cancelled.
    Cancelled,
}

impl JobResult {
    /// Check if the job succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }
}

/// Internal state for a tracked job.
struct JobState {
    kind: RunKind,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    progress_tx: watch::Sender<Progress>,
    result_tx: Option<oneshot::Sender<JobResult>>,
}

/// Manages background jobs with progress tracking.
pub struct JobTracker {
    /// Active jobs by ID.
    jobs: DashMap<JobId, JobState>,

    /// Event broadcaster for job lifecycle events.
    events_tx: broadcast::Sender<JobEvent>,
}

impl JobTracker {
    /// Create a new job tracker.
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            jobs: DashMap::new(),
            events_tx,
        }
    }

    /// Create a new job and return its handle.
    pub fn create(&self, kind: RunKind) -> JobHandle {
        let id = JobId::new();
        let (progress_tx, progress_rx) = watch::channel(Progress::default());
        let (result_tx, result_rx) = oneshot::channel();

        let state = JobState {
            kind,
            started_at: Utc::now(),
            cancel: CancellationToken::new(),
            progress_tx,
            result_tx: Some(result_tx),
        };

        self.jobs.insert(id, state);

        let _ = self.events_tx.send(JobEvent::Started { id, kind });

        JobHandle {
            id,
            progress: progress_rx,
            result: result_rx,
        }
    }

    /// Token the job's worker polls to notice cancellation.
    pub fn token(&self, id: JobId) -> Option<CancellationToken> {
        self.jobs.get(&id).map(|state| state.cancel.clone())
    }

    /// Update progress for a job.
    pub fn update_progress(&self, id: JobId, progress: Progress) {
        if let Some(state) = self.jobs.get(&id) {
            let _ = state.progress_tx.send(progress.clone());
            let _ = self.events_tx.send(JobEvent::Progress {
                id,
                tick: progress.tick,
                message: progress.message,
            });
        }
    }

    /// Complete a job successfully.
    pub fn complete(&self, id: JobId, message: Option<String>, report: Option<RunReport>) {
        if let Some((_, mut state)) = self.jobs.remove(&id) {
            let kind = state.kind;
            debug!(%id, %kind, elapsed_ms = elapsed_ms(&state), "job completed");

            if let Some(tx) = state.result_tx.take() {
                let _ = tx.send(JobResult::Success {
                    kind,
                    message,
                    report,
                });
            }

            let _ = self.events_tx.send(JobEvent::Completed { id, kind });
        }
    }

    /// Mark a job as failed.
    pub fn fail(&self, id: JobId, error: impl Into<String>) {
        let error = error.into();
        if let Some((_, mut state)) = self.jobs.remove(&id) {
            debug!(%id, elapsed_ms = elapsed_ms(&state), %error, "job failed");
            if let Some(tx) = state.result_tx.take() {
                let _ = tx.send(JobResult::Failed {
                    error: error.clone(),
                });
            }

            let _ = self.events_tx.send(JobEvent::Failed { id, error });
        }
    }

    /// Ask a job to stop. The worker reports back through [`JobTracker::mark_cancelled`].
    pub fn cancel(&self, id: JobId) -> Result<()> {
        let state = self.jobs.get(&id).ok_or(Error::JobNotFound(id))?;
        state.cancel.cancel();
        Ok(())
    }

    /// Finish a job that stopped because of cancellation.
    pub fn mark_cancelled(&self, id: JobId) {
        if let Some((_, mut state)) = self.jobs.remove(&id) {
            debug!(%id, elapsed_ms = elapsed_ms(&state), "job cancelled");
            if let Some(tx) = state.result_tx.take() {
                let _ = tx.send(JobResult::Cancelled);
            }

            let _ = self.events_tx.send(JobEvent::Cancelled { id });
        }
    }

    /// Get the number of active jobs.
    pub fn active_count(&self) -> usize {
        self.jobs.len()
    }

    /// Subscribe to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events_tx.subscribe()
    }

    /// Create a new tracker wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_ms(state: &JobState) -> i64 {
    (Utc::now() - state.started_at).num_milliseconds()
}
