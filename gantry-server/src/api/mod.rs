//! API Module
//!
//! HTTP layer for the trigger router and deployment viewers.
//! Each submodule handles endpoints for a specific concern.

pub mod deploy;
pub mod error;
pub mod events;
pub mod health;
pub mod webhook;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use gantry_engine::EngineContext;

/// Shared handler state: the record store pool and the engine context
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub engine: Arc<EngineContext>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Trigger entry points
        .route("/webhook/{slug}", post(webhook::receive_webhook))
        .route("/pipelines/{pipeline_id}/deploy", post(deploy::trigger_deploy))
        // Deployment history and live logs
        .route("/deployments/{id}", get(deploy::get_deployment))
        .route(
            "/pipelines/{pipeline_id}/deployments",
            get(deploy::list_deployments),
        )
        .route(
            "/pipelines/{pipeline_id}/deployments/{deployment_id}/events",
            get(events::deployment_events),
        )
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
