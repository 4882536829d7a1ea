use actix_web::web::Data;
use clap::{Args, Parser, Subcommand};
use std::io;
use tracing::info;
use validator::Validate;

use crate::api::job::{JobService, VideoRequest};
use crate::config::{Config, RendererKind};
use crate::jobs::JobStatus;

#[derive(Parser)]
#[command(name = "vidgen-server", version, about = "Text-to-video generation server")]
pub struct Cli {
    /// Bind address (overrides HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Bind port (overrides PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Rendering backend (overrides RENDERER)
    #[arg(long, value_enum, global = true)]
    pub renderer: Option<RendererKind>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Generate one video in-process and print every progress event as a JSON line
    Generate(GenerateArgs),
}

#[derive(Args)]
pub struct GenerateArgs {
    #[arg(long)]
    pub text: String,
    #[arg(long, default_value_t = 30)]
    pub duration: u32,
    #[arg(long, default_value = "female-natural")]
    pub voice_type: String,
    #[arg(long, default_value = "modern")]
    pub template: String,
    #[arg(long, default_value = "blue-gradient")]
    pub color_scheme: String,
    #[arg(long, default_value = "roboto")]
    pub font_family: String,
    #[arg(long, default_value = "normal")]
    pub speech_speed: String,
}

impl From<GenerateArgs> for VideoRequest {
    fn from(args: GenerateArgs) -> Self {
        VideoRequest {
            text: args.text,
            duration: args.duration,
            voice_type: args.voice_type,
            template: args.template,
            color_scheme: args.color_scheme,
            font_family: args.font_family,
            speech_speed: args.speech_speed,
        }
    }
}

impl Cli {
    /// Command line flags win over the environment
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(renderer) = self.renderer {
            config.renderer = renderer;
        }
    }
}

/// Run a single job to a terminal state, streaming its events to stdout
pub async fn generate(service: Data<JobService>, request: VideoRequest) -> io::Result<()> {
    request
        .validate()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    // Subscribe before the job exists so no event is missed
    let (handle, mut events) = service.subscribe(None).await.map_err(io::Error::other)?;
    let job = service.create_job(request).await.map_err(io::Error::other)?;
    info!(job_id = %job.id, "Generating video");

    while let Some(event) = events.recv().await {
        if event.job_id != job.id {
            continue;
        }
        println!("{}", serde_json::to_string(&event)?);
        if event.is_terminal() {
            break;
        }
    }
    service.unsubscribe(handle).await;

    for pipeline in service.drain_in_flight().await {
        pipeline.await.map_err(io::Error::other)?;
    }

    let job = service.get_job(&job.id).await.map_err(io::Error::other)?;
    match (job.status, job.result, job.error) {
        (JobStatus::Completed, Some(artifact), _) => {
            info!(job_id = %job.id, "Video written to {}", artifact.path.display());
            Ok(())
        }
        (_, _, error) => Err(io::Error::other(
            error.unwrap_or_else(|| format!("job ended in state {:?}", job.status)),
        )),
    }
}
