use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use super::stage::{Pipeline, Stage, StageKind};
use crate::events::{ObserverHub, ProgressEvent};
use crate::jobs::{Artifact, Job, JobId, JobRegistry, RegistryError};
use crate::render::{RenderError, RenderRequest, Renderer};

#[derive(Debug, Error)]
enum ExecutionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Drives jobs through the stage pipeline.
///
/// One `run` per job. Every state change goes through the registry first
/// and is then published to the hub, so a status poll never lags behind
/// what observers have already been told.
pub struct PipelineExecutor {
    registry: Arc<JobRegistry>,
    hub: Arc<ObserverHub>,
    renderer: Arc<dyn Renderer>,
    pipeline: Pipeline,
    tick: Duration,
}

impl PipelineExecutor {
    pub fn new(
        registry: Arc<JobRegistry>,
        hub: Arc<ObserverHub>,
        renderer: Arc<dyn Renderer>,
        pipeline: Pipeline,
        tick: Duration,
    ) -> Self {
        Self {
            registry,
            hub,
            renderer,
            pipeline,
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    /// Spawn a supervised run for `job_id` on `runtime`.
    ///
    /// The run itself executes in an inner task; if that task panics, the
    /// supervisor records the job as failed so it never stays `Processing`.
    pub fn spawn(self: &Arc<Self>, runtime: &Handle, job_id: JobId, request: RenderRequest) -> JoinHandle<()> {
        let executor = self.clone();
        runtime.spawn(async move {
            let worker = executor.clone();
            let run_id = job_id.clone();
            let task = tokio::spawn(async move { worker.run(&run_id, &request).await });

            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(%job_id, "Pipeline aborted: {}", e),
                Err(e) => {
                    error!(%job_id, "Pipeline task died: {}", e);
                    if let Err(e) = executor.fail(&job_id, &format!("pipeline task aborted: {}", e)).await {
                        error!(%job_id, "Failed to record pipeline failure: {}", e);
                    }
                }
            }
        })
    }

    /// Run every stage for `job_id` and leave the job in a terminal state.
    ///
    /// Render failures are recorded on the job and published; only a
    /// missing job is returned as an error.
    pub async fn run(&self, job_id: &JobId, request: &RenderRequest) -> Result<(), RegistryError> {
        info!(
            %job_id,
            total_weight = self.pipeline.total_weight(),
            "Starting pipeline with {} stages",
            self.pipeline.stages().len()
        );

        match self.execute(job_id, request).await {
            Ok(artifact) => {
                info!(%job_id, size_bytes = artifact.size_bytes, "Job completed");
                self.transition(job_id, |job| job.complete(artifact)).await
            }
            Err(ExecutionError::Render(e)) => {
                warn!(%job_id, "Job failed: {}", e);
                self.fail(job_id, &e.to_string()).await
            }
            Err(ExecutionError::Registry(e)) => Err(e),
        }
    }

    /// Mark the job failed and publish the failure event
    pub async fn fail(&self, job_id: &JobId, message: &str) -> Result<(), RegistryError> {
        self.transition(job_id, |job| job.fail(message)).await
    }

    async fn execute(&self, job_id: &JobId, request: &RenderRequest) -> Result<Artifact, ExecutionError> {
        self.registry.update(job_id, Job::begin).await?;

        let mut completed_weight = 0;
        let mut artifact = None;

        for stage in self.pipeline.stages() {
            let entered = self.pipeline.progress_at(completed_weight);
            self.transition(job_id, |job| job.enter_stage(&stage.name, entered)).await?;

            match &stage.kind {
                StageKind::Timed(duration) => {
                    self.wait_out(job_id, stage, completed_weight, *duration).await?;
                }
                StageKind::Render => {
                    artifact = Some(self.renderer.render(job_id, request).await?);
                }
            }

            completed_weight += stage.weight;
            let reached = self.pipeline.progress_at(completed_weight);
            self.transition(job_id, |job| job.record_progress(reached)).await?;
        }

        // Pipeline::new guarantees exactly one render stage
        artifact.ok_or_else(|| RenderError::Failed("pipeline finished without rendering".to_string()).into())
    }

    /// Sleep through a timed stage in `tick` steps, publishing advisory progress
    async fn wait_out(
        &self,
        job_id: &JobId,
        stage: &Stage,
        completed_weight: u32,
        duration: Duration,
    ) -> Result<(), RegistryError> {
        if duration.is_zero() {
            return Ok(());
        }

        let steps = (duration.as_millis() / self.tick.as_millis()).clamp(1, u128::from(u32::MAX)) as u32;
        let step = duration / steps;

        for i in 1..steps {
            sleep(step).await;
            let progress = self.pipeline.interpolate(completed_weight, stage.weight, i, steps);
            let snapshot = self
                .registry
                .update(job_id, |job| {
                    job.record_progress(progress);
                    job.clone()
                })
                .await?;
            self.hub
                .publish(job_id, ProgressEvent::from_job(&snapshot).advisory())
                .await;
        }
        sleep(step).await;
        Ok(())
    }

    /// Mutate the job, then publish the resulting snapshot as a mandatory event
    async fn transition<F>(&self, job_id: &JobId, mutate: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut Job),
    {
        let snapshot = self
            .registry
            .update(job_id, |job| {
                mutate(job);
                job.clone()
            })
            .await?;
        self.hub.publish(job_id, ProgressEvent::from_job(&snapshot)).await;
        Ok(())
    }
}
