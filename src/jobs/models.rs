use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Stage label of a freshly created job
pub const STARTING_LABEL: &str = "Starting...";

/// Stage label once the artifact is available
pub const READY_LABEL: &str = "Ready for download";

/// Stage label of a job that could not be generated
pub const FAILED_LABEL: &str = "Generation failed";

/// Opaque job identifier handed out by the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job status enum representing the lifecycle of a generation request
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed have no outgoing transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Produced video output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_secs: u32,
}

/// One generation request and its tracked lifecycle state.
///
/// The mutators below are the only way the executor changes a job; they
/// keep `progress`, `result` and `error` consistent with `status` and
/// refuse to leave a terminal state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub current_stage: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Artifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            current_stage: STARTING_LABEL.to_string(),
            created_at: Utc::now(),
            result: None,
            error: None,
        }
    }

    pub fn begin(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Processing;
        }
    }

    pub fn enter_stage(&mut self, name: &str, progress: u8) {
        if self.status.is_terminal() {
            return;
        }
        self.current_stage = name.to_string();
        self.record_progress(progress);
    }

    /// Progress only ever moves forward
    pub fn record_progress(&mut self, progress: u8) {
        if self.status.is_terminal() {
            return;
        }
        self.progress = self.progress.max(progress.min(100));
    }

    pub fn complete(&mut self, artifact: Artifact) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_stage = READY_LABEL.to_string();
        self.result = Some(artifact);
        self.error = None;
    }

    /// Progress stays frozen at its last observed value
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.current_stage = FAILED_LABEL.to_string();
        self.result = None;
        self.error = Some(message.into());
    }
}
