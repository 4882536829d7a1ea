use async_trait::async_trait;
use rand::Rng;
use std::path::PathBuf;
use tokio::time::{sleep, Duration};
use tracing::info;

use super::{RenderError, RenderRequest, Renderer};
use crate::jobs::{Artifact, JobId};

/// Stand-in renderer for environments without ffmpeg.
///
/// Waits a random 1..=`max_delay_secs` seconds, fails with probability
/// `failure_rate`, and otherwise writes a small placeholder file.
pub struct SimulatedRenderer {
    output_dir: PathBuf,
    max_delay_secs: u64,
    failure_rate: f64,
}

impl SimulatedRenderer {
    pub fn new(output_dir: PathBuf, max_delay_secs: u64, failure_rate: f64) -> Self {
        Self {
            output_dir,
            max_delay_secs: max_delay_secs.max(1),
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl Renderer for SimulatedRenderer {
    async fn render(&self, job_id: &JobId, request: &RenderRequest) -> Result<Artifact, RenderError> {
        // ThreadRng must not live across an await
        let (delay, fails) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(1..=self.max_delay_secs),
                rng.gen_bool(self.failure_rate),
            )
        };

        info!(%job_id, "Simulating render for {} seconds", delay);
        sleep(Duration::from_secs(delay)).await;

        if fails {
            return Err(RenderError::Failed("simulated render failure".to_string()));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("{}.mp4", job_id));
        let placeholder = format!(
            "simulated video for job {}\nduration: {}s\ntext: {}\n",
            job_id, request.duration_secs, request.text
        );
        tokio::fs::write(&path, placeholder.as_bytes()).await?;

        Ok(Artifact {
            path,
            size_bytes: placeholder.len() as u64,
            duration_secs: request.duration_secs,
        })
    }
}
