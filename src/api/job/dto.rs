use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::events::event::download_ref;
use crate::jobs::{Job, JobStatus};

/// Job snapshot as returned by create, status and list
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub video_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for VideoResponse {
    fn from(job: &Job) -> Self {
        let result = job.result.as_ref().filter(|_| job.status == JobStatus::Completed);
        VideoResponse {
            video_id: job.id.to_string(),
            status: job.status,
            progress: job.progress,
            current_step: job.current_stage.clone(),
            video_url: result.map(|_| download_ref(&job.id)),
            duration: result.map(|a| a.duration_secs),
            file_size: result.map(|a| a.size_bytes),
            error: job.error.clone(),
            created_at: job.created_at,
        }
    }
}

/// Response for the job listing
#[derive(Serialize)]
pub struct JobListResponse {
    pub count: usize,
    pub jobs: Vec<VideoResponse>,
}
