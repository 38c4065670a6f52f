//! Trigger router
//!
//! Both entry points converge on the same engine launch: the webhook path
//! authenticates the sender against the pipeline's secret and cross-checks
//! the payload's repository/branch, the manual path trusts the caller.
//! Rejections here never create a deployment record; the caller gets the
//! matching status synchronously and nothing else happens.

use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

use gantry_core::domain::pipeline::Pipeline;
use gantry_engine::{EngineContext, EngineError};

use crate::repository::pipeline as pipeline_repository;
use crate::service::signature;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("pipeline not found")]
    PipelineNotFound,

    #[error("invalid payload: {0}")]
    MalformedPayload(String),

    #[error("payload repository or branch does not match this pipeline")]
    PayloadMismatch,

    #[error("invalid signature")]
    SignatureInvalid,

    #[error("pipeline '{0}' already has a deployment in progress")]
    Busy(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("failed to launch deployment: {0}")]
    Launch(String),
}

/// Handles a signed webhook delivery for a pipeline slug
pub async fn trigger_webhook(
    pool: &SqlitePool,
    engine: &Arc<EngineContext>,
    slug: &str,
    raw_body: &[u8],
    content_type: Option<&str>,
    signature_header: Option<&str>,
) -> Result<i64, TriggerError> {
    let payload = parse_payload(raw_body, content_type)?;

    let pipeline = pipeline_repository::find_by_slug(pool, slug)
        .await?
        .ok_or(TriggerError::PipelineNotFound)?;

    check_payload_matches(&payload, &pipeline)?;

    let secret = pipeline
        .webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(TriggerError::SignatureInvalid)?;
    let header = signature_header.ok_or(TriggerError::SignatureInvalid)?;
    if !signature::verify_signature(secret, raw_body, header) {
        return Err(TriggerError::SignatureInvalid);
    }

    launch(engine, pipeline).await
}

/// Handles a manual deploy request for a pipeline id
pub async fn trigger_manual(
    pool: &SqlitePool,
    engine: &Arc<EngineContext>,
    id: &str,
) -> Result<i64, TriggerError> {
    let pipeline = pipeline_repository::find_by_slug(pool, id)
        .await?
        .ok_or(TriggerError::PipelineNotFound)?;

    launch(engine, pipeline).await
}

async fn launch(engine: &Arc<EngineContext>, pipeline: Pipeline) -> Result<i64, TriggerError> {
    gantry_engine::launch(engine.clone(), pipeline)
        .await
        .map_err(|e| match e {
            EngineError::Busy { pipeline } => TriggerError::Busy(pipeline),
            other => TriggerError::Launch(other.to_string()),
        })
}

/// GitHub delivers the payload as JSON, or form-encoded under a `payload`
/// field
fn parse_payload(raw_body: &[u8], content_type: Option<&str>) -> Result<Value, TriggerError> {
    if content_type.is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded")) {
        let payload = url::form_urlencoded::parse(raw_body)
            .find(|(key, _)| key == "payload")
            .map(|(_, value)| value.into_owned());

        return match payload {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| TriggerError::MalformedPayload(format!("payload field: {e}"))),
            None => Ok(Value::Null),
        };
    }

    if raw_body.is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_slice(raw_body)
        .map_err(|e| TriggerError::MalformedPayload(format!("body: {e}")))
}

/// A payload carrying repository/ref must match the pipeline exactly, so a
/// delivery for one project cannot be replayed against another pipeline's
/// slug
fn check_payload_matches(payload: &Value, pipeline: &Pipeline) -> Result<(), TriggerError> {
    let repo = payload
        .pointer("/repository/full_name")
        .and_then(Value::as_str);
    let git_ref = payload.get("ref").and_then(Value::as_str);

    if let (Some(repo), Some(git_ref)) = (repo, git_ref) {
        let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);
        if repo != pipeline.repo || branch != pipeline.branch {
            return Err(TriggerError::PayloadMismatch);
        }
    }

    Ok(())
}
