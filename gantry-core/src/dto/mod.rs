//! Data transfer objects for the HTTP boundary

use serde::{Deserialize, Serialize};

use crate::domain::deployment::DeploymentStatus;

/// Response body for an accepted trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerAccepted {
    pub deployment_id: i64,
}

/// Deployment summary for history listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub id: i64,
    pub status: DeploymentStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}
