use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

mod api;
mod cli;
mod config;
mod events;
mod jobs;
mod pipeline;
mod render;
mod shutdown;

use crate::api::{health::health_config, job::handlers::job_config, job::JobService, validation, ws::ws_config};
use crate::cli::{Cli, Command};
use crate::events::ObserverHub;
use crate::jobs::JobRegistry;
use crate::pipeline::{Pipeline, PipelineExecutor};
use crate::shutdown::ShutdownCoordinator;

/// Console plus daily rotating files per level:
/// logs/info.log.2024-12-22, logs/error.log.2024-12-22, etc.
fn init_tracing(log_dir: &Path) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::daily(log_dir, "info.log"))
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::daily(log_dir, "warn.log"))
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::daily(log_dir, "error.log"))
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(tracing_appender::rolling::daily(log_dir, "debug.log"))
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    // stderr keeps stdout free for `generate` output
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .init();
}

/// Wire registry, hub, renderer and executor into the job facade
fn build_service(config: &config::Config) -> std::io::Result<web::Data<JobService>> {
    let pipeline = Pipeline::video_generation(config.stage_time_scale)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let registry = Arc::new(JobRegistry::new());
    let hub = Arc::new(ObserverHub::new(config.subscriber_buffer));
    let executor = Arc::new(PipelineExecutor::new(
        registry.clone(),
        hub.clone(),
        render::from_config(config),
        pipeline,
        config.stage_tick,
    ));
    Ok(web::Data::new(JobService::new(registry, hub, executor)))
}

async fn serve(config: config::Config, service: web::Data<JobService>) -> std::io::Result<()> {
    let max_payload_size = config.max_payload_size;
    let server_service = service.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_service.clone())
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .app_data(validation::json_config().limit(max_payload_size))
            .configure(health_config)
            .configure(job_config)
            .configure(ws_config)
    });

    info!("Server starting on http://{}:{}", config.host, config.port);

    let server = server.bind((config.host.as_str(), config.port))?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    ShutdownCoordinator::new(server_handle, server_task, service)
        .wait_for_shutdown()
        .await
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let mut config = config::Config::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    cli.apply(&mut config);

    std::fs::create_dir_all(&config.log_dir)?;
    init_tracing(&config.log_dir);

    info!("Starting vidgen-server");
    info!("Configuration loaded successfully:");
    info!("  - Renderer: {:?}", config.renderer);
    info!("  - Output directory: {}", config.output_dir.display());
    info!("  - Max payload size: {} bytes", config.max_payload_size);
    info!("  - Stage tick: {:?}, time scale: {}", config.stage_tick, config.stage_time_scale);
    info!("  - Subscriber buffer: {}", config.subscriber_buffer);

    let service = build_service(&config)?;

    match cli.command {
        Some(Command::Generate(args)) => cli::generate(service, args.into()).await,
        Some(Command::Serve) | None => serve(config, service).await,
    }
}
