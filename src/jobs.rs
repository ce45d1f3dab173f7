//! Fire-and-forget background jobs with a polling-friendly status record.
//!
//! Not a queue: each spawn detaches one task that writes its progress into
//! the key/value store under `<kind>_job:<jobId>`. Clients poll until they
//! observe a terminal state. No cancellation and no dedup of concurrent
//! jobs; concurrency is assumed low. The task body runs under a wall-clock
//! timeout so the record always reaches a terminal state.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::counter;
use tracing::warn;
use uuid::Uuid;

use crate::model::{JobState, JobStatus};
use crate::store::{kv_get_as, kv_set_as, SharedStorage, JOB_TTL_SECS};

pub const JOB_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Single-issue deep dive.
    Trend,
    /// Weekly aggregate.
    Weekly,
}

impl JobKind {
    fn key_prefix(self) -> &'static str {
        match self {
            JobKind::Trend => "trend_job",
            JobKind::Weekly => "weekly_job",
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            JobKind::Trend => "job",
            JobKind::Weekly => "weekly",
        }
    }
}

pub fn job_key(kind: JobKind, job_id: &str) -> String {
    format!("{}:{}", kind.key_prefix(), job_id)
}

/// Opaque id: kind prefix, spawn time, random fragment.
pub fn new_job_id(kind: JobKind) -> String {
    let fragment = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        kind.id_prefix(),
        Utc::now().timestamp_millis(),
        &fragment[..9]
    )
}

#[derive(Default)]
struct ProgressGate {
    last_progress: u8,
    terminal: bool,
}

/// Write handle the background task reports through. Progress never
/// decreases; once a terminal state is written, later writes are dropped.
#[derive(Clone)]
pub struct JobProgress {
    storage: SharedStorage,
    key: String,
    gate: Arc<Mutex<ProgressGate>>,
}

impl JobProgress {
    fn new(storage: SharedStorage, key: String) -> Self {
        Self {
            storage,
            key,
            gate: Arc::new(Mutex::new(ProgressGate::default())),
        }
    }

    /// Record a status transition. Storage failures are logged, not fatal:
    /// a broken status write should not kill the work itself.
    pub async fn write(&self, mut status: JobStatus) {
        let permitted = {
            let mut gate = self.gate.lock().expect("progress gate poisoned");
            if gate.terminal {
                false
            } else {
                if status.progress < gate.last_progress {
                    status.progress = gate.last_progress;
                }
                gate.last_progress = status.progress;
                if status.status.is_terminal() {
                    gate.terminal = true;
                }
                true
            }
        };
        if !permitted {
            warn!(key = %self.key, "dropping status write after terminal state");
            return;
        }
        if let Err(e) = kv_set_as(self.storage.as_ref(), &self.key, &status, Some(JOB_TTL_SECS)).await
        {
            warn!(key = %self.key, error = ?e, "job status write failed");
        }
    }

    pub async fn running(&self, state: JobState, progress: u8, message: Option<String>) {
        let mut status = JobStatus::running(state, progress);
        status.message = message;
        self.write(status).await;
    }
}

/// Spawn a detached job and return its id immediately. The closure reports
/// through the handed [`JobProgress`]; an `Err` or a timeout transitions
/// the record to `failed`.
pub async fn spawn_job<F, Fut>(
    storage: SharedStorage,
    kind: JobKind,
    initial: JobStatus,
    work: F,
) -> Result<String>
where
    F: FnOnce(JobProgress) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    spawn_job_with_timeout(storage, kind, initial, JOB_TIMEOUT, work).await
}

pub async fn spawn_job_with_timeout<F, Fut>(
    storage: SharedStorage,
    kind: JobKind,
    initial: JobStatus,
    timeout: Duration,
    work: F,
) -> Result<String>
where
    F: FnOnce(JobProgress) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let job_id = new_job_id(kind);
    let key = job_key(kind, &job_id);
    let progress = JobProgress::new(storage, key);

    // The initial record must exist before the id is handed out, or an
    // immediate poll would read "not found".
    progress.write(initial).await;
    counter!("jobs_spawned_total").increment(1);

    tokio::spawn(async move {
        match tokio::time::timeout(timeout, work(progress.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = ?e, "background job failed");
                counter!("jobs_failed_total").increment(1);
                progress.write(JobStatus::failed(e.to_string())).await;
            }
            Err(_) => {
                warn!("background job hit its wall-clock timeout");
                counter!("jobs_failed_total").increment(1);
                progress
                    .write(JobStatus::failed(format!(
                        "job exceeded its {}s time limit",
                        timeout.as_secs()
                    )))
                    .await;
            }
        }
    });

    Ok(job_id)
}

/// Poll a job's status record; `None` after expiry or for unknown ids.
pub async fn job_status(
    storage: &dyn crate::store::StorageAdapter,
    kind: JobKind,
    job_id: &str,
) -> Result<Option<JobStatus>> {
    kv_get_as(storage, &job_key(kind, job_id))
        .await
        .context("reading job status")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStorage;
    use std::sync::Arc;

    #[test]
    fn job_ids_are_unique_and_prefixed() {
        let a = new_job_id(JobKind::Weekly);
        let b = new_job_id(JobKind::Weekly);
        assert_ne!(a, b);
        assert!(a.starts_with("weekly_"));
        assert!(new_job_id(JobKind::Trend).starts_with("job_"));
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_terminal_is_final() {
        let storage: SharedStorage = Arc::new(MemoryStorage::new());
        let progress = JobProgress::new(storage.clone(), "trend_job:test".to_string());

        progress.running(JobState::Generating, 50, None).await;
        // A late lower write is clamped up to 50.
        progress.running(JobState::Generating, 10, None).await;
        let status: JobStatus = kv_get_as(storage.as_ref(), "trend_job:test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.progress, 50);

        progress.write(JobStatus::completed("done")).await;
        progress.write(JobStatus::failed("too late")).await;
        let status: JobStatus = kv_get_as(storage.as_ref(), "trend_job:test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.report.as_deref(), Some("done"));
    }
}
