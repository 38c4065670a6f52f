//! Deployment domain types

use serde::{Deserialize, Serialize};

/// One execution attempt of a pipeline
///
/// Created in `Running` state the instant a trigger is accepted, mutated
/// exactly once at the end of execution, never again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: i64,
    pub pipeline_id: String,
    pub status: DeploymentStatus,
    /// Accumulated log text, possibly truncated for storage
    pub log: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Deployment lifecycle status; transitions only forward:
/// `Running` -> `Success` | `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Running,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Running => "running",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => DeploymentStatus::Success,
            "failed" => DeploymentStatus::Failed,
            _ => DeploymentStatus::Running,
        }
    }
}
