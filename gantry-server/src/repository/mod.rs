//! Repository layer
//!
//! All database access goes through these modules as parameterized
//! statements. The adapters at the bottom hand the engine its store traits
//! backed by the same pool.

pub mod deployment;
pub mod module;
pub mod pipeline;

use async_trait::async_trait;
use sqlx::SqlitePool;

use gantry_core::domain::deployment::DeploymentStatus;
use gantry_core::domain::module::Module;
use gantry_engine::store::{DeploymentStore, ModuleSource};

/// sqlx-backed module source handed to the engine
#[derive(Clone)]
pub struct SqlxModuleSource {
    pool: SqlitePool,
}

impl SqlxModuleSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModuleSource for SqlxModuleSource {
    async fn get_module(&self, id: &str) -> anyhow::Result<Option<Module>> {
        Ok(module::find_by_id(&self.pool, id).await?)
    }
}

/// sqlx-backed deployment store handed to the engine
#[derive(Clone)]
pub struct SqlxDeploymentStore {
    pool: SqlitePool,
}

impl SqlxDeploymentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeploymentStore for SqlxDeploymentStore {
    async fn insert_running(&self, pipeline_id: &str) -> anyhow::Result<i64> {
        Ok(deployment::insert_running(&self.pool, pipeline_id, chrono::Utc::now()).await?)
    }

    async fn finalize(
        &self,
        id: i64,
        status: DeploymentStatus,
        log: &str,
        finished_at: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<bool> {
        Ok(deployment::finalize(&self.pool, id, status, log, finished_at).await?)
    }
}
