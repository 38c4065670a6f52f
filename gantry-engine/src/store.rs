//! Store traits at the engine boundary
//!
//! The engine consumes modules and writes deployment records through these
//! traits; the server wires in sqlx-backed implementations at startup.

use async_trait::async_trait;

use gantry_core::domain::deployment::DeploymentStatus;
use gantry_core::domain::module::Module;

/// Read access to reusable script templates
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Resolves a module id to its script body and declared parameters
    async fn get_module(&self, id: &str) -> anyhow::Result<Option<Module>>;
}

/// Write access to deployment records
///
/// `insert_running` happens before script composition so that composition and
/// dispatch failures are still attributable to a visible record.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Inserts a `running` record and returns its id
    async fn insert_running(&self, pipeline_id: &str) -> anyhow::Result<i64>;

    /// Single terminal update of status, log, and end timestamp
    ///
    /// Returns false when the record was already finalized; the call is then
    /// a no-op.
    async fn finalize(
        &self,
        id: i64,
        status: DeploymentStatus,
        log: &str,
        finished_at: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<bool>;
}
