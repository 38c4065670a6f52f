//! Live log event stream
//!
//! Server-sent events for one deployment, filtered from the engine's
//! broadcast channel. The stream ends after the terminal status event; a
//! subscriber that connects late simply misses earlier chunks, the log file
//! and deployment record remain the source of truth.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use gantry_core::domain::event::DeployEvent;

use crate::api::AppState;

/// GET /pipelines/{pipeline_id}/deployments/{deployment_id}/events
pub async fn deployment_events(
    State(state): State<AppState>,
    Path((pipeline_id, deployment_id)): Path<(String, i64)>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(
        "Live event subscriber for pipeline '{}', deployment {}",
        pipeline_id,
        deployment_id
    );

    let rx = state.engine.events.subscribe();

    let stream = futures::stream::unfold(
        (rx, pipeline_id, false),
        move |(mut rx, pipeline_id, done)| async move {
            if done {
                return None;
            }
            loop {
                match rx.recv().await {
                    Ok(event) if event.matches(&pipeline_id, deployment_id) => {
                        let terminal = event.is_terminal();
                        let name = match &event {
                            DeployEvent::Log { .. } => "log",
                            DeployEvent::Status { .. } => "status",
                        };
                        // Control characters are escaped by the JSON encoding,
                        // so the SSE data line stays single-line
                        let data = serde_json::to_string(&event).unwrap_or_default();
                        let sse_event = Event::default().event(name).data(data);
                        return Some((
                            Ok::<_, Infallible>(sse_event),
                            (rx, pipeline_id, terminal),
                        ));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Live event subscriber lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}
