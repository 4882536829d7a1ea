use serde::Serialize;

use crate::jobs::{Job, JobId, JobStatus};

/// Progress notification pushed to observers.
///
/// Serialized as the JSON record clients receive over their stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub progress: u8,
    pub stage: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Intermediate updates may be dropped for a backed-up subscriber
    #[serde(skip)]
    pub advisory: bool,
}

impl ProgressEvent {
    pub fn from_job(job: &Job) -> Self {
        let (artifact_ref, file_size, duration) = match &job.result {
            Some(artifact) if job.status == JobStatus::Completed => (
                Some(download_ref(&job.id)),
                Some(artifact.size_bytes),
                Some(artifact.duration_secs),
            ),
            _ => (None, None, None),
        };

        Self {
            job_id: job.id.clone(),
            progress: job.progress,
            stage: job.current_stage.clone(),
            status: job.status,
            artifact_ref,
            file_size,
            duration,
            error: job.error.clone(),
            advisory: false,
        }
    }

    pub fn advisory(mut self) -> Self {
        self.advisory = true;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Retrieval path of a completed job's artifact
pub fn download_ref(id: &JobId) -> String {
    format!("/download/{}", id)
}
