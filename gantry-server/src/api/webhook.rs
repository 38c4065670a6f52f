//! Webhook API Handler
//!
//! Receives signed push deliveries and hands them to the trigger service.
//! Responds as soon as the deployment is accepted; the pipeline outcome is
//! never part of this response.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
};

use gantry_core::dto::TriggerAccepted;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::trigger;

/// POST /webhook/{slug}
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<TriggerAccepted>)> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());

    tracing::info!("Webhook delivery for pipeline '{}'", slug);

    let deployment_id = trigger::trigger_webhook(
        &state.pool,
        &state.engine,
        &slug,
        &body,
        content_type,
        signature,
    )
    .await?;

    Ok((StatusCode::ACCEPTED, Json(TriggerAccepted { deployment_id })))
}
