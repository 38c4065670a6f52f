//! Deployment repository
//!
//! Single-row inserts and updates only. The finalize statement is guarded on
//! the current status so a second finalization attempt changes nothing and
//! status never moves backwards.

use sqlx::SqlitePool;

use gantry_core::domain::deployment::{Deployment, DeploymentStatus};
use gantry_core::dto::DeploymentSummary;

/// Insert a `running` record, returning its id
pub async fn insert_running(
    pool: &SqlitePool,
    pipeline_id: &str,
    started_at: chrono::DateTime<chrono::Utc>,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO deployments (pipeline_id, status, log, started_at)
        VALUES (?, 'running', '', ?)
        "#,
    )
    .bind(pipeline_id)
    .bind(started_at)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Terminal update of status, log, and end timestamp
///
/// Returns false when the record was not in `running` state, in which case
/// nothing was written.
pub async fn finalize(
    pool: &SqlitePool,
    id: i64,
    status: DeploymentStatus,
    log: &str,
    finished_at: chrono::DateTime<chrono::Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE deployments
        SET status = ?, log = ?, finished_at = ?
        WHERE id = ? AND status = 'running'
        "#,
    )
    .bind(status.as_str())
    .bind(log)
    .bind(finished_at)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Find a deployment by id
pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Deployment>, sqlx::Error> {
    let row = sqlx::query_as::<_, DeploymentRow>(
        r#"
        SELECT id, pipeline_id, status, log, started_at, finished_at
        FROM deployments
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Recent deployments of one pipeline, newest first
pub async fn list_for_pipeline(
    pool: &SqlitePool,
    pipeline_id: &str,
) -> Result<Vec<DeploymentSummary>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SummaryRow>(
        r#"
        SELECT id, status, started_at, finished_at
        FROM deployments
        WHERE pipeline_id = ?
        ORDER BY started_at DESC
        LIMIT 50
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: i64,
    pipeline_id: String,
    status: String,
    log: String,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<DeploymentRow> for Deployment {
    fn from(row: DeploymentRow) -> Self {
        Deployment {
            id: row.id,
            pipeline_id: row.pipeline_id,
            status: DeploymentStatus::parse(&row.status),
            log: row.log,
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: i64,
    status: String,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<SummaryRow> for DeploymentSummary {
    fn from(row: SummaryRow) -> Self {
        DeploymentSummary {
            id: row.id,
            status: DeploymentStatus::parse(&row.status),
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}
