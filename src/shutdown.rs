use actix_web::dev::ServerHandle;
use actix_web::web::Data;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::api::job::JobService;

/// Handles graceful shutdown of the application
///
/// This module orchestrates graceful shutdown by:
/// 1. Listening for shutdown signals (SIGTERM, SIGINT/CTRL+C)
/// 2. Stopping the HTTP server (stops accepting new requests)
/// 3. Closing every progress subscriber and refusing new ones
/// 4. Waiting for in-flight pipelines to reach a terminal state
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    service: Data<JobService>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        service: Data<JobService>,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            service,
        }
    }

    /// Wait for CTRL+C or SIGTERM (Unix only), then shut down
    pub async fn wait_for_shutdown(self) -> Result<(), std::io::Error> {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {:?}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = ctrl_c => {
                result?;
                info!("Received CTRL+C signal, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
        }

        self.shutdown().await
    }

    /// Perform the actual shutdown sequence
    async fn shutdown(self) -> Result<(), std::io::Error> {
        // 1. Stop HTTP server (stop accepting new requests); the stop
        // command is sent now, graceful completion is awaited below
        info!("Stopping HTTP server (no longer accepting new requests)...");
        let server_stopped = self.server_handle.stop(true);

        // 2. Close progress streams so open WebSocket connections can end
        self.service.hub().close_all().await;
        server_stopped.await;

        // 3. Jobs cannot be cancelled, let them reach a terminal state
        let pipelines = self.service.drain_in_flight().await;
        let total = pipelines.len();
        info!("Waiting for {} in-flight pipelines...", total);
        for (i, handle) in pipelines.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!("Pipeline {} failed to stop cleanly: {:?}", i + 1, e);
            }
        }
        info!("All pipelines finished");

        // 4. Wait for HTTP server task to complete
        match self.server_task.await {
            Ok(Ok(_)) => info!("HTTP server shut down successfully"),
            Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
            Err(e) => error!("HTTP server task panicked: {:?}", e),
        }

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}
