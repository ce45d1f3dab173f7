// tests/jobs_runner.rs
//
// Background-job contract: the id is returned immediately with a readable
// initial status, the record reaches a terminal state on success, failure
// and timeout, and nothing is written after a terminal state.

use std::sync::Arc;
use std::time::Duration;

use daily_brief::jobs::{job_status, spawn_job, spawn_job_with_timeout, JobKind};
use daily_brief::model::{JobState, JobStatus};
use daily_brief::store::{memory::MemoryStorage, SharedStorage};

async fn wait_for_terminal(
    storage: &dyn daily_brief::store::StorageAdapter,
    kind: JobKind,
    job_id: &str,
) -> JobStatus {
    for _ in 0..100 {
        if let Some(status) = job_status(storage, kind, job_id).await.unwrap() {
            if status.status.is_terminal() {
                return status;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn successful_job_reports_progress_then_completes() {
    let storage: SharedStorage = Arc::new(MemoryStorage::new());

    let job_id = spawn_job(
        storage.clone(),
        JobKind::Trend,
        JobStatus::running(JobState::Generating, 10),
        |progress| async move {
            progress.running(JobState::Generating, 60, None).await;
            progress.write(JobStatus::completed("# the report")).await;
            Ok(())
        },
    )
    .await
    .unwrap();
    assert!(job_id.starts_with("job_"));

    // The initial record is readable as soon as the id is handed out.
    let initial = job_status(storage.as_ref(), JobKind::Trend, &job_id)
        .await
        .unwrap()
        .expect("initial status present");
    assert!(initial.progress >= 10);

    let done = wait_for_terminal(storage.as_ref(), JobKind::Trend, &job_id).await;
    assert_eq!(done.status, JobState::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.report.as_deref(), Some("# the report"));
}

#[tokio::test]
async fn failing_job_lands_in_failed_state() {
    let storage: SharedStorage = Arc::new(MemoryStorage::new());

    let job_id = spawn_job(
        storage.clone(),
        JobKind::Weekly,
        JobStatus::running(JobState::Collecting, 5),
        |_progress| async move { anyhow::bail!("upstream unavailable") },
    )
    .await
    .unwrap();
    assert!(job_id.starts_with("weekly_"));

    let done = wait_for_terminal(storage.as_ref(), JobKind::Weekly, &job_id).await;
    assert_eq!(done.status, JobState::Failed);
    assert_eq!(done.error.as_deref(), Some("upstream unavailable"));
}

#[tokio::test]
async fn hung_job_is_failed_by_the_timeout() {
    let storage: SharedStorage = Arc::new(MemoryStorage::new());

    let job_id = spawn_job_with_timeout(
        storage.clone(),
        JobKind::Trend,
        JobStatus::running(JobState::Generating, 10),
        Duration::from_millis(100),
        |_progress| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        },
    )
    .await
    .unwrap();

    let done = wait_for_terminal(storage.as_ref(), JobKind::Trend, &job_id).await;
    assert_eq!(done.status, JobState::Failed);
    assert!(done.error.unwrap().contains("time limit"));
}

#[tokio::test]
async fn unknown_job_ids_read_as_absent() {
    let storage: SharedStorage = Arc::new(MemoryStorage::new());
    let missing = job_status(storage.as_ref(), JobKind::Trend, "job_0_nonexistent")
        .await
        .unwrap();
    assert!(missing.is_none());
}
