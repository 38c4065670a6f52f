//! Deployment API Handlers
//!
//! Manual triggering and deployment record lookups for history viewers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use gantry_core::domain::deployment::Deployment;
use gantry_core::dto::{DeploymentSummary, TriggerAccepted};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::repository::{deployment as deployment_repository, pipeline as pipeline_repository};
use crate::service::trigger;

/// POST /pipelines/{pipeline_id}/deploy
pub async fn trigger_deploy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<TriggerAccepted>)> {
    tracing::info!("Manual deploy requested for pipeline '{}'", id);

    let deployment_id = trigger::trigger_manual(&state.pool, &state.engine, &id).await?;

    Ok((StatusCode::ACCEPTED, Json(TriggerAccepted { deployment_id })))
}

/// GET /deployments/{id}
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Deployment>> {
    tracing::debug!("Getting deployment: {}", id);

    let deployment = deployment_repository::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Deployment {id} not found")))?;

    Ok(Json(deployment))
}

/// GET /pipelines/{pipeline_id}/deployments
pub async fn list_deployments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<DeploymentSummary>>> {
    tracing::debug!("Listing deployments for pipeline: {}", id);

    pipeline_repository::find_by_slug(&state.pool, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pipeline not found".to_string()))?;

    let summaries = deployment_repository::list_for_pipeline(&state.pool, &id).await?;

    Ok(Json(summaries))
}
