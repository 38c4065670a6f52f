//! Pipeline repository
//!
//! Read access to pipeline definitions. Pipelines are created and edited by
//! the management layer; the engine only ever reads a snapshot here.

use sqlx::SqlitePool;

use gantry_core::domain::pipeline::{ExecTarget, Pipeline, Step};

/// Find a pipeline by its slug id
pub async fn find_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Pipeline>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, name, repo, branch, workdir, webhook_secret, ssh_host, ssh_user, steps
        FROM pipelines
        WHERE id = ?
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: String,
    name: String,
    repo: String,
    branch: String,
    workdir: String,
    webhook_secret: Option<String>,
    ssh_host: Option<String>,
    ssh_user: Option<String>,
    steps: String,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        let target = match row.ssh_host {
            Some(host) if !host.is_empty() => ExecTarget::Remote {
                host,
                user: row
                    .ssh_user
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| "root".to_string()),
            },
            _ => ExecTarget::Local,
        };

        let steps: Vec<Step> = serde_json::from_str(&row.steps).unwrap_or_default();

        Pipeline {
            id: row.id,
            name: row.name,
            repo: row.repo,
            branch: row.branch,
            workdir: row.workdir,
            webhook_secret: row.webhook_secret,
            target,
            steps,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;
    use std::collections::HashMap;

    fn sample(target: ExecTarget) -> Pipeline {
        Pipeline {
            id: "shop".to_string(),
            name: "Shop".to_string(),
            repo: "acme/shop".to_string(),
            branch: "main".to_string(),
            workdir: "~/apps/shop".to_string(),
            webhook_secret: Some("secret".to_string()),
            target,
            steps: vec![Step {
                module_id: "generic-bash".to_string(),
                params: HashMap::from([("SCRIPT_CONTENT".to_string(), "echo hi".to_string())]),
            }],
        }
    }

    #[tokio::test]
    async fn test_find_local_pipeline() {
        let pool = memory_pool().await;
        testing::insert(&pool, &sample(ExecTarget::Local)).await;

        let found = find_by_slug(&pool, "shop").await.unwrap().unwrap();
        assert_eq!(found.target, ExecTarget::Local);
        assert_eq!(found.steps.len(), 1);
        assert_eq!(found.steps[0].module_id, "generic-bash");
        assert_eq!(
            found.steps[0].params.get("SCRIPT_CONTENT").unwrap(),
            "echo hi"
        );
    }

    #[tokio::test]
    async fn test_find_remote_pipeline() {
        let pool = memory_pool().await;
        testing::insert(
            &pool,
            &sample(ExecTarget::Remote {
                host: "deploy.example.com".to_string(),
                user: "ops".to_string(),
            }),
        )
        .await;

        let found = find_by_slug(&pool, "shop").await.unwrap().unwrap();
        assert_eq!(
            found.target,
            ExecTarget::Remote {
                host: "deploy.example.com".to_string(),
                user: "ops".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_ssh_user_defaults_to_root() {
        let pool = memory_pool().await;
        sqlx::query(
            "INSERT INTO pipelines (id, name, repo, branch, workdir, ssh_host, ssh_user) VALUES ('x', 'X', 'a/b', 'main', '/tmp', 'h', '')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let found = find_by_slug(&pool, "x").await.unwrap().unwrap();
        assert_eq!(
            found.target,
            ExecTarget::Remote {
                host: "h".to_string(),
                user: "root".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_slug() {
        let pool = memory_pool().await;
        assert!(find_by_slug(&pool, "nope").await.unwrap().is_none());
    }
}
