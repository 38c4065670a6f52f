//! Gantry Engine
//!
//! The pipeline execution engine: composes a pipeline's steps into one shell
//! script, dispatches it to the local host or a remote host over ssh,
//! supervises the process with a timeout, fans every output chunk out to the
//! log file, the stored record, and live subscribers, and finalizes the
//! deployment record exactly once.
//!
//! Flow per accepted trigger:
//! record created -> script composed -> process dispatched -> supervised ->
//! record finalized. Failures after acceptance become a finalized `failed`
//! deployment with a readable log line; they never reach the caller, which
//! already got its response.

pub mod compose;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod fanout;
pub mod store;
pub mod supervise;

pub use config::EngineConfig;
pub use context::EngineContext;
pub use error::EngineError;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use gantry_core::domain::deployment::DeploymentStatus;
use gantry_core::domain::event::{DeployEvent, LogStream};
use gantry_core::domain::pipeline::{ExecTarget, Pipeline};

use crate::dispatch::PipelineLease;
use crate::fanout::{LogFanout, OutputChunk};
use crate::supervise::Outcome;

/// Accepts a pipeline snapshot for execution
///
/// Takes the pipeline's lease, creates the `running` deployment record, and
/// hands the rest of the run to a background task. Returns the deployment id
/// as soon as both have happened; the caller never waits for completion.
pub async fn launch(ctx: Arc<EngineContext>, pipeline: Pipeline) -> Result<i64, EngineError> {
    let lease = ctx
        .leases
        .try_acquire(&pipeline.id)
        .ok_or_else(|| EngineError::Busy {
            pipeline: pipeline.id.clone(),
        })?;

    let deployment_id = ctx.deployments.insert_running(&pipeline.id).await?;

    tracing::info!(
        "Deployment {} accepted for pipeline '{}'",
        deployment_id,
        pipeline.id
    );

    tokio::spawn(execute(ctx.clone(), pipeline, deployment_id, lease));

    Ok(deployment_id)
}

/// Runs one deployment to completion and finalizes its record
async fn execute(
    ctx: Arc<EngineContext>,
    pipeline: Pipeline,
    deployment_id: i64,
    lease: PipelineLease,
) {
    let started_at = Utc::now();

    let (tx, rx) = mpsc::channel(64);
    let fanout = LogFanout::new(
        &ctx.config,
        &pipeline.id,
        deployment_id,
        started_at,
        ctx.events.clone(),
    );
    let pump = tokio::spawn(fanout.run(rx));

    send_info(
        &tx,
        format!(
            "Initializing pipeline for {} (deployment {})...\n",
            pipeline.name, deployment_id
        ),
    )
    .await;

    let outcome = run_pipeline(&ctx, &pipeline, deployment_id, &tx).await;

    // Close the channel so the fan-out drains and hands the log back
    drop(tx);
    let log = match pump.await {
        Ok(fanout) => fanout.storage_log(),
        Err(e) => {
            tracing::error!(
                "Log fan-out task failed for deployment {}: {}",
                deployment_id,
                e
            );
            String::new()
        }
    };

    let status = match outcome {
        Outcome::Exited(0) => DeploymentStatus::Success,
        Outcome::Exited(_) | Outcome::TimedOut | Outcome::Errored(_) => DeploymentStatus::Failed,
    };

    match ctx
        .deployments
        .finalize(deployment_id, status, &log, Utc::now())
        .await
    {
        Ok(true) => {}
        Ok(false) => tracing::warn!("Deployment {} was already finalized", deployment_id),
        Err(e) => tracing::error!("Failed to finalize deployment {}: {}", deployment_id, e),
    }

    ctx.events.publish(DeployEvent::Status {
        pipeline_id: pipeline.id.clone(),
        deployment_id,
        status,
    });

    tracing::info!(
        "Deployment {} finished with status {}",
        deployment_id,
        status.as_str()
    );

    drop(lease);
}

/// Compose, dispatch, supervise; every failure becomes a logged outcome
async fn run_pipeline(
    ctx: &EngineContext,
    pipeline: &Pipeline,
    deployment_id: i64,
    tx: &mpsc::Sender<OutputChunk>,
) -> Outcome {
    let script = match compose::compose_script(pipeline, ctx.modules.as_ref(), &ctx.config).await {
        Ok(script) => script,
        Err(e) => {
            send_error(tx, format!("\nERROR: {e}\n")).await;
            return Outcome::Errored(e.to_string());
        }
    };

    send_info(
        tx,
        format!(
            "Generated pipeline script with {} steps.\n",
            pipeline.steps.len()
        ),
    )
    .await;

    if let ExecTarget::Remote { host, user } = &pipeline.target {
        send_info(tx, format!("Target: Remote Host ({user}@{host}) via SSH\n")).await;
    }

    let prepared = match dispatch::prepare(pipeline, deployment_id, &script, &ctx.config) {
        Ok(prepared) => prepared,
        Err(e) => {
            send_error(tx, format!("\nERROR: {e}\n")).await;
            return Outcome::Errored(e.to_string());
        }
    };

    let outcome = supervise::supervise(prepared, &script, ctx.config.timeout(), tx.clone()).await;

    match &outcome {
        Outcome::Exited(code) => {
            send_info(tx, format!("\nPipeline finished with code {code}\n")).await;
        }
        Outcome::TimedOut => {
            send_info(tx, "\nPipeline terminated due to timeout.\n".to_string()).await;
        }
        Outcome::Errored(msg) => {
            send_error(tx, format!("\nERROR: {msg}\n")).await;
        }
    }

    outcome
}

async fn send_info(tx: &mpsc::Sender<OutputChunk>, data: String) {
    let _ = tx
        .send(OutputChunk {
            stream: LogStream::Stdout,
            data,
        })
        .await;
}

async fn send_error(tx: &mpsc::Sender<OutputChunk>, data: String) {
    let _ = tx
        .send(OutputChunk {
            stream: LogStream::Stderr,
            data,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gantry_core::domain::module::Module;
    use gantry_core::domain::pipeline::Step;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct MemModules(HashMap<String, Module>);

    #[async_trait]
    impl store::ModuleSource for MemModules {
        async fn get_module(&self, id: &str) -> anyhow::Result<Option<Module>> {
            Ok(self.0.get(id).cloned())
        }
    }

    #[derive(Clone, Debug)]
    struct MemRow {
        status: DeploymentStatus,
        log: String,
        finished_at: Option<chrono::DateTime<Utc>>,
    }

    #[derive(Default)]
    struct MemStore {
        rows: Mutex<HashMap<i64, MemRow>>,
        next_id: AtomicI64,
    }

    impl MemStore {
        fn snapshot(&self, id: i64) -> Option<MemRow> {
            self.rows.lock().unwrap().get(&id).cloned()
        }
    }

    #[async_trait]
    impl store::DeploymentStore for MemStore {
        async fn insert_running(&self, _pipeline_id: &str) -> anyhow::Result<i64> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.rows.lock().unwrap().insert(
                id,
                MemRow {
                    status: DeploymentStatus::Running,
                    log: String::new(),
                    finished_at: None,
                },
            );
            Ok(id)
        }

        async fn finalize(
            &self,
            id: i64,
            status: DeploymentStatus,
            log: &str,
            finished_at: chrono::DateTime<Utc>,
        ) -> anyhow::Result<bool> {
            let mut rows = self.rows.lock().unwrap();
            let Some(row) = rows.get_mut(&id) else {
                return Ok(false);
            };
            if row.status != DeploymentStatus::Running {
                return Ok(false);
            }
            row.status = status;
            row.log = log.to_string();
            row.finished_at = Some(finished_at);
            Ok(true)
        }
    }

    fn test_context(dir: &TempDir, body: &str) -> (Arc<EngineContext>, Arc<MemStore>) {
        let modules = MemModules(HashMap::from([(
            "run".to_string(),
            Module {
                id: "run".to_string(),
                name: "Run".to_string(),
                body: body.to_string(),
                params: vec![],
            },
        )]));
        let store = Arc::new(MemStore::default());
        let config = EngineConfig {
            timeout_minutes: 10,
            logs_dir: dir.path().join("logs"),
            scratch_dir: dir.path().join("scratch"),
            domain: "localhost".to_string(),
        };
        let ctx = Arc::new(EngineContext::new(
            config,
            Arc::new(modules),
            store.clone(),
        ));
        (ctx, store)
    }

    fn test_pipeline(dir: &TempDir) -> Pipeline {
        Pipeline {
            id: "demo".to_string(),
            name: "Demo".to_string(),
            repo: "user/demo".to_string(),
            branch: "main".to_string(),
            workdir: dir.path().to_string_lossy().into_owned(),
            webhook_secret: None,
            target: ExecTarget::Local,
            steps: vec![Step {
                module_id: "run".to_string(),
                params: HashMap::new(),
            }],
        }
    }

    async fn wait_for_finalized(store: &MemStore, id: i64) -> MemRow {
        for _ in 0..250 {
            if let Some(row) = store.snapshot(id) {
                if row.finished_at.is_some() {
                    return row;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("deployment {id} never finalized");
    }

    #[tokio::test]
    async fn test_successful_deployment() {
        let dir = TempDir::new().unwrap();
        let (ctx, store) = test_context(&dir, "echo hello from gantry");
        let mut events = ctx.events.subscribe();

        let id = launch(ctx.clone(), test_pipeline(&dir)).await.unwrap();
        let row = wait_for_finalized(&store, id).await;

        assert_eq!(row.status, DeploymentStatus::Success);
        assert!(row.log.contains("hello from gantry"));
        assert!(row.log.contains("Pipeline finished with code 0"));

        // On-disk log exists and carries the same output
        let logs_dir = dir.path().join("logs");
        let entries: Vec<_> = std::fs::read_dir(&logs_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        // Scratch script was cleaned up
        let scratch: Vec<_> = std::fs::read_dir(dir.path().join("scratch"))
            .unwrap()
            .collect();
        assert!(scratch.is_empty());

        // Terminal status event was published
        loop {
            match events.recv().await.unwrap() {
                DeployEvent::Status {
                    deployment_id,
                    status,
                    ..
                } => {
                    assert_eq!(deployment_id, id);
                    assert_eq!(status, DeploymentStatus::Success);
                    break;
                }
                DeployEvent::Log { .. } => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_failing_deployment() {
        let dir = TempDir::new().unwrap();
        let (ctx, store) = test_context(&dir, "exit 3");

        let id = launch(ctx, test_pipeline(&dir)).await.unwrap();
        let row = wait_for_finalized(&store, id).await;

        assert_eq!(row.status, DeploymentStatus::Failed);
        assert!(row.log.contains("Pipeline finished with code 3"));
    }

    #[tokio::test]
    async fn test_composition_failure_still_finalizes() {
        let dir = TempDir::new().unwrap();
        let (ctx, store) = test_context(&dir, "echo {{CMD}}");

        let mut pipeline = test_pipeline(&dir);
        pipeline.steps[0]
            .params
            .insert("CMD".to_string(), "oops; rm -rf /".to_string());

        let id = launch(ctx, pipeline).await.unwrap();
        let row = wait_for_finalized(&store, id).await;

        assert_eq!(row.status, DeploymentStatus::Failed);
        assert!(row.log.contains("injection"));
    }

    #[tokio::test]
    async fn test_missing_module_still_finalizes() {
        let dir = TempDir::new().unwrap();
        let (ctx, store) = test_context(&dir, "echo unused");

        let mut pipeline = test_pipeline(&dir);
        pipeline.steps[0].module_id = "ghost".to_string();

        let id = launch(ctx, pipeline).await.unwrap();
        let row = wait_for_finalized(&store, id).await;

        assert_eq!(row.status, DeploymentStatus::Failed);
        assert!(row.log.contains("not found"));
    }

    #[tokio::test]
    async fn test_concurrent_launch_of_same_pipeline_is_busy() {
        let dir = TempDir::new().unwrap();
        let (ctx, store) = test_context(&dir, "sleep 1");

        let id = launch(ctx.clone(), test_pipeline(&dir)).await.unwrap();

        match launch(ctx.clone(), test_pipeline(&dir)).await {
            Err(EngineError::Busy { pipeline }) => assert_eq!(pipeline, "demo"),
            other => panic!("expected Busy, got {other:?}"),
        }

        let row = wait_for_finalized(&store, id).await;
        assert_eq!(row.status, DeploymentStatus::Success);

        // Lease is released after finalization
        assert!(launch(ctx, test_pipeline(&dir)).await.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_output_truncated_in_record_only() {
        let dir = TempDir::new().unwrap();
        let (ctx, store) = test_context(
            &dir,
            "for i in $(seq 1 20000); do echo 0123456789012345678901234567890123456789; done",
        );

        let id = launch(ctx, test_pipeline(&dir)).await.unwrap();
        let row = wait_for_finalized(&store, id).await;

        assert_eq!(row.status, DeploymentStatus::Success);
        assert!(row.log.starts_with(fanout::TRUNCATION_MARKER));
        assert!(row.log.len() <= fanout::TRUNCATION_MARKER.len() + fanout::MAX_STORED_LOG_BYTES);

        // The on-disk file keeps everything
        let logs_dir = dir.path().join("logs");
        let entry = std::fs::read_dir(&logs_dir).unwrap().next().unwrap().unwrap();
        assert!(entry.metadata().unwrap().len() as usize > fanout::MAX_STORED_LOG_BYTES);
    }
}
