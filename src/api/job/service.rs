use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::models::VideoRequest;
use crate::api::validation::ErrorResponse;
use crate::events::{ObserverHub, ProgressEvent, SubscriberHandle};
use crate::jobs::{Artifact, Job, JobId, JobRegistry, JobStatus, RegistryError};
use crate::pipeline::PipelineExecutor;

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Job id was never issued
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Artifact requested before the job completed
    #[error("Job not ready: {0}")]
    NotReady(JobId),

    /// Completed job whose output file is gone
    #[error("Video file not found for job {0}")]
    ArtifactMissing(JobId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => ServiceError::NotFound(id),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) | ServiceError::ArtifactMissing(_) => StatusCode::NOT_FOUND,
            ServiceError::NotReady(_) => StatusCode::BAD_REQUEST,
            ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, message) = match self {
            ServiceError::NotFound(id) => {
                warn!("Job not found: {}", id);
                ("Not found", "Video not found".to_string())
            }
            ServiceError::NotReady(id) => {
                warn!("Download requested before completion: {}", id);
                ("Not ready", "Video not ready".to_string())
            }
            ServiceError::ArtifactMissing(id) => {
                error!("Artifact missing on disk for job {}", id);
                ("Not found", "Video file not found".to_string())
            }
            ServiceError::Io(e) => {
                error!("I/O error: {}", e);
                ("Failed to process request", "I/O error occurred".to_string())
            }
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error.to_string(),
            fields: serde_json::json!({ "message": message }),
        })
    }
}

/// Facade over the registry, the hub and the executor.
///
/// Pipelines are spawned on the runtime captured at construction so they
/// outlive the HTTP worker that accepted the request; their handles are
/// kept so shutdown can wait for in-flight jobs.
pub struct JobService {
    registry: Arc<JobRegistry>,
    hub: Arc<ObserverHub>,
    executor: Arc<PipelineExecutor>,
    runtime: Handle,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl JobService {
    /// Create a new JobService instance; must be called inside a tokio runtime
    pub fn new(registry: Arc<JobRegistry>, hub: Arc<ObserverHub>, executor: Arc<PipelineExecutor>) -> Self {
        Self {
            registry,
            hub,
            executor,
            runtime: Handle::current(),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Register a job and start its pipeline in the background.
    ///
    /// Returns the queued snapshot immediately.
    pub async fn create_job(&self, request: VideoRequest) -> Result<Job, ServiceError> {
        let job_id = self.registry.create().await;
        info!(%job_id, duration = request.duration, chars = request.text.chars().count(), "Service: Creating video job");

        let snapshot = self.registry.get(&job_id).await?;

        let handle = self.executor.spawn(&self.runtime, job_id, request.into());
        let mut in_flight = self.in_flight.lock().await;
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);

        info!(job_id = %snapshot.id, total_jobs = self.registry.len().await, "Service: Pipeline started");
        Ok(snapshot)
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job, ServiceError> {
        Ok(self.registry.get(id).await?)
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        self.registry.list().await
    }

    /// Artifact of a completed job whose file still exists
    pub async fn artifact(&self, id: &JobId) -> Result<Artifact, ServiceError> {
        let job = self.registry.get(id).await?;
        let artifact = match (job.status, job.result) {
            (JobStatus::Completed, Some(artifact)) => artifact,
            _ => return Err(ServiceError::NotReady(id.clone())),
        };

        if !tokio::fs::try_exists(&artifact.path).await? {
            return Err(ServiceError::ArtifactMissing(id.clone()));
        }
        Ok(artifact)
    }

    /// Subscribe to one job's events, or to every job's when `job_id` is `None`
    pub async fn subscribe(
        &self,
        job_id: Option<JobId>,
    ) -> Result<(SubscriberHandle, mpsc::Receiver<ProgressEvent>), ServiceError> {
        if let Some(id) = &job_id {
            self.registry.get(id).await?;
        }
        Ok(self.hub.subscribe(job_id).await)
    }

    pub async fn unsubscribe(&self, handle: SubscriberHandle) {
        self.hub.unsubscribe(handle).await;
    }

    pub fn hub(&self) -> &ObserverHub {
        &self.hub
    }

    /// Take the handles of every pipeline that may still be running
    pub async fn drain_in_flight(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.in_flight.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::render::SimulatedRenderer;
    use tokio::time::Duration;

    fn service(output: &std::path::Path, failure_rate: f64) -> JobService {
        let registry = Arc::new(JobRegistry::new());
        let hub = Arc::new(ObserverHub::default());
        let renderer = Arc::new(SimulatedRenderer::new(output.to_path_buf(), 1, failure_rate));
        let executor = Arc::new(PipelineExecutor::new(
            registry.clone(),
            hub.clone(),
            renderer,
            Pipeline::video_generation(0.0).unwrap(),
            Duration::from_millis(100),
        ));
        JobService::new(registry, hub, executor)
    }

    fn request() -> VideoRequest {
        serde_json::from_str(r#"{"text": "Hello world."}"#).unwrap()
    }

    async fn wait_all(service: &JobService) {
        for handle in service.drain_in_flight().await {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn created_job_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), 0.0);

        let job = service.create_job(request()).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);

        wait_all(&service).await;

        let done = service.get_job(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        let artifact = service.artifact(&job.id).await.unwrap();
        assert!(artifact.path.starts_with(dir.path()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_has_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), 1.0);

        let job = service.create_job(request()).await.unwrap();
        wait_all(&service).await;

        assert_eq!(service.get_job(&job.id).await.unwrap().status, JobStatus::Failed);
        assert!(matches!(service.artifact(&job.id).await, Err(ServiceError::NotReady(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn removed_artifact_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), 0.0);

        let job = service.create_job(request()).await.unwrap();
        wait_all(&service).await;
        let artifact = service.artifact(&job.id).await.unwrap();
        std::fs::remove_file(&artifact.path).unwrap();

        assert!(matches!(
            service.artifact(&job.id).await,
            Err(ServiceError::ArtifactMissing(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test(start_paused = true)]
    async fn unreadable_artifact_dir_is_an_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let service = service(&output, 0.0);

        let job = service.create_job(request()).await.unwrap();
        wait_all(&service).await;
        std::fs::set_permissions(&output, std::fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores directory permissions
        let access = std::fs::metadata(output.join("anything"));
        let result = service.artifact(&job.id).await;
        std::fs::set_permissions(&output, std::fs::Permissions::from_mode(0o755)).unwrap();

        if matches!(access, Err(ref e) if e.kind() == std::io::ErrorKind::PermissionDenied) {
            assert!(matches!(result, Err(ServiceError::Io(_))));
        }
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path(), 0.0);
        let missing = JobId::from("missing");

        assert!(matches!(service.get_job(&missing).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(service.artifact(&missing).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(service.subscribe(Some(missing)).await, Err(ServiceError::NotFound(_))));
        assert!(service.subscribe(None).await.is_ok());
    }

    #[test]
    fn errors_map_to_status_codes() {
        let id = JobId::from("x");
        assert_eq!(ServiceError::NotFound(id.clone()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ServiceError::NotReady(id.clone()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::ArtifactMissing(id).status_code(), StatusCode::NOT_FOUND);
    }
}
