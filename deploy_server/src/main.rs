//! Sitedrop server: on-demand static site build and deploy.
//!
//! Accepts `POST /deploy { "url": ... }`, builds the repository in a
//! throwaway container, uploads `dist/` to object storage and answers with
//! the public site URL.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use sitedrop_server::config::DeployConfig;
use sitedrop_server::routes::{self, DeployRouterState};
use sitedrop_server::services::deployer::Deployer;
use sitedrop_server::services::storage::{ObjectStorage, ObjectStoreBackend, UnconfiguredStorage};

#[derive(Parser)]
#[command(name = "sitedrop", about = "On-demand static site build and deploy service")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "DEPLOY_PORT", default_value = "3000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();

    tracing::info!("Starting Sitedrop server...");

    let mut config = DeployConfig::from_env();
    if config.output_dir.is_relative() {
        config.output_dir = std::env::current_dir()?.join(&config.output_dir);
    }
    tokio::fs::create_dir_all(&config.output_dir).await?;
    tracing::info!(output_dir = %config.output_dir.display(), "Workspace root ready");

    // A bad storage config fails each deployment, not startup.
    let storage: Arc<dyn ObjectStorage> = match ObjectStoreBackend::s3(&config) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            tracing::error!("S3 client unavailable, deployments will fail at upload: {e}");
            Arc::new(UnconfiguredStorage::new(e.to_string()))
        }
    };

    let deployer = Arc::new(Deployer::from_config(&config, storage));
    let app = routes::deploy_router(DeployRouterState { deployer });

    // Initialize metrics
    sitedrop_server::metrics::init_metrics();

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("Sitedrop server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
