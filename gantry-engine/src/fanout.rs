//! Log fan-out
//!
//! Every output chunk of a deployment goes to three sinks: a per-deployment
//! append-only file on disk, an in-memory accumulator persisted at
//! finalization, and the live event channel. The file is never truncated;
//! the stored copy is capped so a runaway pipeline cannot balloon the record
//! store.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use gantry_core::domain::event::{DeployEvent, LogStream};

use crate::config::EngineConfig;
use crate::events::EventBroadcaster;

/// Ceiling for the log text persisted to the deployment record
pub const MAX_STORED_LOG_BYTES: usize = 500 * 1024;

/// Prefix marking a storage-capped log
pub const TRUNCATION_MARKER: &str = "...[Truncated, view full log file for details]...\n";

/// One chunk of child output, tagged with its stream
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub stream: LogStream,
    pub data: String,
}

/// Per-deployment sink set
pub struct LogFanout {
    pipeline_id: String,
    deployment_id: i64,
    log_path: PathBuf,
    file: Option<File>,
    accumulated: String,
    events: EventBroadcaster,
}

impl LogFanout {
    pub fn new(
        config: &EngineConfig,
        pipeline_id: &str,
        deployment_id: i64,
        started_at: chrono::DateTime<chrono::Utc>,
        events: EventBroadcaster,
    ) -> Self {
        let timestamp = started_at
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
            .replace([':', '.'], "-");
        let log_path = config.logs_dir.join(format!("{pipeline_id}-{timestamp}.log"));

        Self {
            pipeline_id: pipeline_id.to_string(),
            deployment_id,
            log_path,
            file: None,
            accumulated: String::new(),
            events,
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Consumes chunks until every sender is gone, then flushes the file
    pub async fn run(mut self, mut rx: mpsc::Receiver<OutputChunk>) -> Self {
        while let Some(chunk) = rx.recv().await {
            self.emit(chunk.stream, &chunk.data).await;
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.flush().await {
                tracing::warn!("Failed to flush log file {}: {}", self.log_path.display(), e);
            }
        }
        self
    }

    /// Routes one chunk to all three sinks
    pub async fn emit(&mut self, stream: LogStream, data: &str) {
        self.accumulated.push_str(data);

        if let Err(e) = self.append_to_file(data).await {
            tracing::warn!("Failed to write log file {}: {}", self.log_path.display(), e);
        }

        self.events.publish(DeployEvent::Log {
            pipeline_id: self.pipeline_id.clone(),
            deployment_id: self.deployment_id,
            stream,
            data: data.to_string(),
        });
    }

    async fn append_to_file(&mut self, data: &str) -> std::io::Result<()> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                if let Some(parent) = self.log_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.log_path)
                    .await?;
                self.file.insert(file)
            }
        };
        file.write_all(data.as_bytes()).await
    }

    /// Full untruncated log text
    pub fn full_log(&self) -> &str {
        &self.accumulated
    }

    /// Log text capped for the record store
    pub fn storage_log(&self) -> String {
        cap_for_storage(&self.accumulated)
    }
}

/// Caps log text at the storage ceiling, keeping the trailing slice behind a
/// visible marker
pub fn cap_for_storage(log: &str) -> String {
    if log.len() <= MAX_STORED_LOG_BYTES {
        return log.to_string();
    }

    let mut start = log.len() - MAX_STORED_LOG_BYTES;
    while !log.is_char_boundary(start) {
        start += 1;
    }

    format!("{}{}", TRUNCATION_MARKER, &log[start..])
}
