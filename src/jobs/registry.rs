use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use super::models::{Job, JobId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    NotFound(JobId),
}

/// In-memory store of every job created during the process lifetime.
///
/// Callers never see the lock: each operation takes it for exactly as long
/// as the read or mutation needs. Jobs are never removed.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh queued job and return its id
    pub async fn create(&self) -> JobId {
        let id = JobId::generate();
        let job = Job::new(id.clone());
        self.jobs.write().await.insert(id.clone(), job);
        debug!(job_id = %id, "Registered job");
        id
    }

    /// Snapshot of the current record
    pub async fn get(&self, id: &JobId) -> Result<Job, RegistryError> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Apply `mutator` to the record while holding the write lock.
    ///
    /// Whatever the mutator returns is handed back, which lets callers take
    /// a post-mutation snapshot in the same critical section.
    pub async fn update<F, R>(&self, id: &JobId, mutator: F) -> Result<R, RegistryError>
    where
        F: FnOnce(&mut Job) -> R,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        Ok(mutator(job))
    }

    /// All jobs, newest first
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}
