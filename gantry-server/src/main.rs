//! Gantry Server
//!
//! Webhook-triggered pipeline execution service.
//!
//! Architecture:
//! - db/repository: SQLite persistence for pipelines, modules, deployments
//! - service: signature verification and the trigger router
//! - api: axum HTTP layer (webhook, manual deploy, history, live logs)
//! - gantry-engine: script composition, dispatch, and process supervision

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod db;
pub mod repository;
pub mod service;

use std::sync::Arc;

use gantry_engine::{EngineConfig, EngineContext};

use crate::repository::{SqlxDeploymentStore, SqlxModuleSource};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gantry_server=debug,gantry_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gantry server...");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://gantry.db".to_string());

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create database pool");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    db::seed_default_modules(&pool)
        .await
        .expect("Failed to seed stock modules");

    let config = EngineConfig::from_env();
    config.validate().expect("Invalid engine configuration");
    tracing::info!(
        "Engine configured: timeout {}m, logs {}, scratch {}",
        config.timeout_minutes,
        config.logs_dir.display(),
        config.scratch_dir.display()
    );

    let engine = Arc::new(EngineContext::new(
        config,
        Arc::new(SqlxModuleSource::new(pool.clone())),
        Arc::new(SqlxDeploymentStore::new(pool.clone())),
    ));

    // Build router with all API endpoints
    let app = api::create_router(api::AppState { pool, engine });

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
