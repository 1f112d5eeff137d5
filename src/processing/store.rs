//! Job table abstraction with in-memory and JSON-file backends.
//!
//! The orchestrator only talks to [`JobStore`]. Terminal records (`finished`/`failed`) are
//! immutable: [`JobStore::update`] refuses to touch them.

use crate::processing::types::{ErrorCategory, Job, JobStatus, Stage};
use crate::qdrant::payload::current_timestamp_rfc3339;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Errors raised by job stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A job with this id already exists.
    #[error("job {0} already exists")]
    Duplicate(String),
    /// No job with this id exists.
    #[error("job {0} not found")]
    NotFound(String),
    /// The job already reached a terminal state.
    #[error("job {0} is already terminal")]
    Terminal(String),
    /// Reading or writing the job table failed.
    #[error("job table IO failed: {0}")]
    Io(#[from] std::io::Error),
    /// The job table could not be (de)serialized.
    #[error("job table is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Mutation applied to a stored job.
pub type JobMutation = Box<dyn FnOnce(&mut Job) + Send>;

/// Storage for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record.
    async fn create(&self, job: Job) -> Result<(), StoreError>;

    /// Snapshot of a record.
    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    /// Apply `mutation` to a non-terminal record and return the updated snapshot.
    async fn update(&self, job_id: &str, mutation: JobMutation) -> Result<Job, StoreError>;

    /// Atomically move a `queued` record to `running`.
    ///
    /// Returns `None` when the record is missing or not queued, so a job is processed at most once.
    async fn claim(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<Job>, StoreError>;
}

type JobTable = HashMap<String, Job>;

fn apply_update(table: &mut JobTable, job_id: &str, mutation: JobMutation) -> Result<Job, StoreError> {
    let job = table
        .get_mut(job_id)
        .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
    if job.status.is_terminal() {
        return Err(StoreError::Terminal(job_id.to_string()));
    }
    mutation(job);
    job.updated_at = current_timestamp_rfc3339();
    Ok(job.clone())
}

fn apply_claim(table: &mut JobTable, job_id: &str) -> Option<Job> {
    let job = table.get_mut(job_id)?;
    if job.status != JobStatus::Queued {
        return None;
    }
    job.status = JobStatus::Running;
    job.stage = Some(Stage::Route);
    job.error = None;
    job.updated_at = current_timestamp_rfc3339();
    Some(job.clone())
}

fn sorted(table: &JobTable) -> Vec<Job> {
    let mut jobs: Vec<Job> = table.values().cloned().collect();
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    jobs
}

/// Process-local job store.
#[derive(Default, Clone)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<JobTable>>,
}

impl InMemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_id) {
            return Err(StoreError::Duplicate(job.job_id));
        }
        jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update(&self, job_id: &str, mutation: JobMutation) -> Result<Job, StoreError> {
        apply_update(&mut *self.jobs.write().await, job_id, mutation)
    }

    async fn claim(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(apply_claim(&mut *self.jobs.write().await, job_id))
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        Ok(sorted(&*self.jobs.read().await))
    }
}

/// Job store persisted to a JSON file after every mutation.
pub struct JsonFileJobStore {
    file_path: PathBuf,
    jobs: RwLock<JobTable>,
}

impl JsonFileJobStore {
    /// Open the table at `file_path`, creating it lazily on first write.
    ///
    /// Records left `running` by a previous process are marked `failed`.
    pub async fn open(file_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let file_path = file_path.into();
        let mut jobs: JobTable = match fs::read(&file_path).await {
            Ok(bytes) if bytes.is_empty() => JobTable::new(),
            Ok(bytes) => {
                let records: Vec<Job> = serde_json::from_slice(&bytes)?;
                records
                    .into_iter()
                    .map(|job| (job.job_id.clone(), job))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => JobTable::new(),
            Err(err) => return Err(err.into()),
        };

        let mut interrupted = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Failed;
                job.stage = Some(Stage::Failed);
                job.error = Some(format!(
                    "{}: process stopped while the job was running",
                    ErrorCategory::Interrupted
                ));
                job.updated_at = current_timestamp_rfc3339();
                interrupted += 1;
            }
        }

        let store = Self {
            file_path,
            jobs: RwLock::new(jobs),
        };
        if interrupted > 0 {
            tracing::warn!(interrupted, path = %store.file_path.display(), "Marked interrupted jobs as failed");
            store.persist(&*store.jobs.read().await).await?;
        }
        tracing::debug!(path = %store.file_path.display(), "Job table loaded");
        Ok(store)
    }

    async fn persist(&self, table: &JobTable) -> Result<(), StoreError> {
        write_json_atomic(&self.file_path, &sorted(table)).await
    }
}

#[async_trait]
impl JobStore for JsonFileJobStore {
    async fn create(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_id) {
            return Err(StoreError::Duplicate(job.job_id));
        }
        jobs.insert(job.job_id.clone(), job);
        self.persist(&jobs).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn update(&self, job_id: &str, mutation: JobMutation) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = apply_update(&mut jobs, job_id, mutation)?;
        self.persist(&jobs).await?;
        Ok(job)
    }

    async fn claim(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.write().await;
        let claimed = apply_claim(&mut jobs, job_id);
        if claimed.is_some() {
            self.persist(&jobs).await?;
        }
        Ok(claimed)
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        Ok(sorted(&*self.jobs.read().await))
    }
}

/// Write `value` as pretty JSON via a temp file and rename.
pub(crate) async fn write_json_atomic<T>(path: &Path, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }

    let tmp_path = temp_path(path);
    let json = serde_json::to_vec_pretty(value)?;
    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|name| format!("{}.tmp", name.to_string_lossy()))
        .unwrap_or_else(|| "tmp.json".to_string());
    tmp.set_file_name(file_name);
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::Strategy;

    fn job(id: &str, created_at: &str) -> Job {
        Job::queued(
            id.into(),
            "doc.pdf".into(),
            PathBuf::from(format!("/data/uploads/{id}__doc.pdf")),
            None,
            created_at.into(),
        )
    }

    #[tokio::test]
    async fn claim_moves_queued_to_running_once() {
        let store = InMemoryJobStore::new();
        store.create(job("a", "2025-01-01T00:00:00Z")).await.expect("create");

        let claimed = store.claim("a").await.expect("claim").expect("claimed");
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.stage, Some(Stage::Route));
        assert!(store.claim("a").await.expect("claim").is_none());
        assert!(store.claim("missing").await.expect("claim").is_none());
    }

    #[tokio::test]
    async fn terminal_jobs_are_immutable() {
        let store = InMemoryJobStore::new();
        store.create(job("a", "2025-01-01T00:00:00Z")).await.expect("create");
        store
            .update("a", Box::new(|job| job.status = JobStatus::Finished))
            .await
            .expect("finish");

        let error = store
            .update("a", Box::new(|job| job.chunks = Some(99)))
            .await
            .expect_err("terminal");
        assert!(matches!(error, StoreError::Terminal(_)));
        let stored = store.get("a").await.expect("get").expect("job");
        assert_eq!(stored.chunks, None);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = InMemoryJobStore::new();
        store.create(job("a", "2025-01-01T00:00:00Z")).await.expect("create");
        let error = store
            .create(job("a", "2025-01-01T00:00:00Z"))
            .await
            .expect_err("duplicate");
        assert!(matches!(error, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let store = InMemoryJobStore::new();
        store.create(job("late", "2025-01-02T00:00:00Z")).await.expect("create");
        store.create(job("early", "2025-01-01T00:00:00Z")).await.expect("create");

        let ids: Vec<_> = store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|job| job.job_id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn json_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jobs.json");

        {
            let store = JsonFileJobStore::open(&path).await.expect("open");
            store.create(job("a", "2025-01-01T00:00:00Z")).await.expect("create");
            store
                .update(
                    "a",
                    Box::new(|job| {
                        job.route = Some(Strategy::Ocr);
                        job.status = JobStatus::Finished;
                        job.chunks = Some(3);
                    }),
                )
                .await
                .expect("update");
        }

        let reopened = JsonFileJobStore::open(&path).await.expect("reopen");
        let stored = reopened.get("a").await.expect("get").expect("job");
        assert_eq!(stored.status, JobStatus::Finished);
        assert_eq!(stored.route, Some(Strategy::Ocr));
        assert_eq!(stored.chunks, Some(3));
        assert!(!dir.path().join("jobs.json.tmp").exists());
    }

    #[tokio::test]
    async fn running_jobs_are_failed_on_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("jobs.json");

        {
            let store = JsonFileJobStore::open(&path).await.expect("open");
            store.create(job("a", "2025-01-01T00:00:00Z")).await.expect("create");
            store.claim("a").await.expect("claim");
        }

        let reopened = JsonFileJobStore::open(&path).await.expect("reopen");
        let stored = reopened.get("a").await.expect("get").expect("job");
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(
            stored
                .error
                .as_deref()
                .is_some_and(|error| error.starts_with("Interrupted:"))
        );
    }
}
