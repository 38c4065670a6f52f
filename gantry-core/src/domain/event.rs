//! Live deployment event types

use serde::{Deserialize, Serialize};

use crate::domain::deployment::DeploymentStatus;

/// Which child stream a log chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Event published on the live channel while a deployment runs
///
/// `Log` carries one output chunk; `Status` is the terminal event emitted
/// exactly once after finalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum DeployEvent {
    Log {
        pipeline_id: String,
        deployment_id: i64,
        stream: LogStream,
        data: String,
    },
    Status {
        pipeline_id: String,
        deployment_id: i64,
        status: DeploymentStatus,
    },
}

impl DeployEvent {
    /// True when the event belongs to the given deployment
    pub fn matches(&self, pipeline_id: &str, deployment_id: i64) -> bool {
        match self {
            DeployEvent::Log {
                pipeline_id: p,
                deployment_id: d,
                ..
            }
            | DeployEvent::Status {
                pipeline_id: p,
                deployment_id: d,
                ..
            } => p == pipeline_id && *d == deployment_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployEvent::Status { .. })
    }
}
