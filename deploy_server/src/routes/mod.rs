//! Deploy service HTTP routes.

pub mod api;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::deployer::Deployer;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct DeployRouterState {
    pub deployer: Arc<Deployer>,
}

/// Build the service's Axum router.
pub fn deploy_router(state: DeployRouterState) -> Router {
    Router::new()
        .route("/deploy", post(deploy_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn deploy_handler(
    State(state): State<DeployRouterState>,
    Json(req): Json<api::DeployRequest>,
) -> Result<Json<api::DeployResponse>, (StatusCode, Json<api::ErrorResponse>)> {
    crate::metrics::deploy_requested();

    // Run on its own task so a dropped connection cannot cancel the
    // pipeline before cleanup has run.
    let deployer = state.deployer.clone();
    let outcome = tokio::spawn(async move { deployer.deploy(&req.url).await }).await;

    let failed = || {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(api::ErrorResponse::deployment_failed()),
        )
    };

    match outcome {
        Ok(Ok(job)) => match job.result_url {
            Some(site_url) => Ok(Json(api::DeployResponse { site_url })),
            None => {
                tracing::error!(job_id = %job.id, "Succeeded job has no site URL");
                Err(failed())
            }
        },
        Ok(Err(failure)) => {
            tracing::error!(
                job_id = %failure.job_id,
                stage = %failure.stage,
                "Deployment failed: {}",
                failure.error
            );
            Err(failed())
        }
        Err(e) => {
            tracing::error!("Deployment task aborted: {e}");
            Err(failed())
        }
    }
}

async fn health_handler() -> Json<api::HealthResponse> {
    Json(api::HealthResponse { status: "ok" })
}
