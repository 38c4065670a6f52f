//! Database bootstrap
//!
//! SQLite pool creation, idempotent migrations, and stock module seeding.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            repo TEXT NOT NULL,
            branch TEXT NOT NULL,
            workdir TEXT NOT NULL,
            webhook_secret TEXT,
            ssh_host TEXT,
            ssh_user TEXT,
            steps TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS modules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            body TEXT NOT NULL,
            params TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pipeline_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'running',
            log TEXT NOT NULL DEFAULT '',
            started_at TEXT NOT NULL,
            finished_at TEXT,
            FOREIGN KEY(pipeline_id) REFERENCES pipelines(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployments_pipeline_id ON deployments(pipeline_id, started_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Seeds the stock script modules on a fresh database
pub async fn seed_default_modules(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM modules")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let laravel_body = r#"#!/bin/bash
set -e
echo "--- Starting Laravel Deployment [{{STACK_NAME}}] ---"
if [ ! -d ".git" ]; then
    git clone -b {{BRANCH}} {{REPO_URL}} .
else
    git fetch origin {{BRANCH}}
    git reset --hard origin/{{BRANCH}}
fi
docker build -t {{IMAGE_NAME}}:latest .
docker stack deploy -c docker-compose.yml --with-registry-auth {{STACK_NAME}}
echo "Deployment finished for {{DOMAIN}}""#;

    let nodejs_body = r#"#!/bin/bash
set -e
echo "--- Starting Node.js Deployment [{{SERVICE_NAME}}] ---"
if [ ! -d ".git" ]; then
    git clone -b {{BRANCH}} {{REPO_URL}} .
else
    git fetch origin {{BRANCH}}
    git reset --hard origin/{{BRANCH}}
fi
docker build -t {{IMAGE_NAME}}:latest .
docker service update --image {{IMAGE_NAME}}:latest --with-registry-auth {{SERVICE_NAME}}
echo "Service {{SERVICE_NAME}} updated for {{DOMAIN}}""#;

    let stock = [
        (
            "laravel-swarm",
            "Laravel Pipeline",
            laravel_body,
            r#"["IMAGE_NAME","STACK_NAME","DOMAIN"]"#,
        ),
        (
            "nodejs-swarm",
            "Node.js Update",
            nodejs_body,
            r#"["IMAGE_NAME","SERVICE_NAME","DOMAIN"]"#,
        ),
        (
            "generic-bash",
            "Custom Script",
            "#!/bin/bash\n{{SCRIPT_CONTENT}}",
            r#"["SCRIPT_CONTENT"]"#,
        ),
    ];

    for (id, name, body, params) in stock {
        sqlx::query("INSERT INTO modules (id, name, body, params) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(body)
            .bind(params)
            .execute(pool)
            .await?;
    }

    tracing::info!("Seeded {} stock modules", stock.len());
    Ok(())
}
