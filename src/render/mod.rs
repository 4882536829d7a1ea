//! Video rendering backends.
//!
//! The pipeline executor treats rendering as one opaque call per job: it
//! hands over a [`RenderRequest`] and gets back an [`Artifact`] or a
//! [`RenderError`]. Temporary files are the renderer's business.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, RendererKind};
use crate::jobs::{Artifact, JobId};

pub mod ffmpeg;
pub mod simulated;
pub mod slides;

pub use ffmpeg::FfmpegRenderer;
pub use simulated::SimulatedRenderer;

/// Voice selection for speech synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceConfig {
    pub voice_type: String,
    pub speech_speed: String,
}

/// Visual style of the generated slides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleConfig {
    pub template: String,
    pub color_scheme: String,
    pub font_family: String,
}

/// Everything a renderer needs to produce one video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub text: String,
    pub duration_secs: u32,
    pub voice: VoiceConfig,
    pub style: StyleConfig,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{0}")]
    Failed(String),

    #[error("speech synthesis failed: {0}")]
    Speech(String),

    #[error("video encoding failed: {0}")]
    Encode(String),

    #[error("render io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Produce the video for `job_id`, suspending until it is written or fails
    async fn render(&self, job_id: &JobId, request: &RenderRequest) -> Result<Artifact, RenderError>;
}

/// Build the renderer selected by configuration
pub fn from_config(config: &Config) -> Arc<dyn Renderer> {
    match config.renderer {
        RendererKind::Ffmpeg => Arc::new(FfmpegRenderer::new(
            config.ffmpeg_path.clone(),
            config.espeak_path.clone(),
            config.output_dir.clone(),
        )),
        RendererKind::Simulated => Arc::new(SimulatedRenderer::new(
            config.output_dir.clone(),
            config.simulated_max_delay_secs,
            config.simulated_failure_rate,
        )),
    }
}
