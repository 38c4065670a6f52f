//! Execution dispatcher
//!
//! Turns a composed script into a concrete process invocation for the
//! pipeline's target. Both targets write the script to a local scratch file:
//! local execution runs it directly, remote execution streams it to a
//! non-interactive ssh session's stdin so nothing is left on the remote
//! filesystem. The scratch file is deleted exactly once, on every exit path,
//! by its guard's `Drop`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::Command;

use gantry_core::domain::pipeline::{ExecTarget, Pipeline};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// A spawn-ready invocation plus the scratch file backing it
pub struct PreparedProcess {
    pub command: Command,
    pub script: ScriptFile,
    /// Remote targets read the script from stdin
    pub pipe_script_to_stdin: bool,
}

/// Builds the invocation for a deployment
pub fn prepare(
    pipeline: &Pipeline,
    deployment_id: i64,
    script_text: &str,
    config: &EngineConfig,
) -> Result<PreparedProcess, EngineError> {
    let script = ScriptFile::create(&config.scratch_dir, &pipeline.id, deployment_id, script_text)?;

    let (mut command, pipe_script_to_stdin) = match &pipeline.target {
        ExecTarget::Local => {
            let mut cmd = Command::new("bash");
            cmd.arg(script.path());
            cmd.current_dir(expand_workdir(&pipeline.workdir));
            cmd.stdin(Stdio::null());
            (cmd, false)
        }
        ExecTarget::Remote { host, user } => {
            let mut cmd = Command::new("ssh");
            cmd.args([
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
            ]);
            cmd.arg(format!("{user}@{host}"));
            cmd.arg("bash -s");
            cmd.stdin(Stdio::piped());
            (cmd, true)
        }
    };

    command.env("PIPELINE_ID", &pipeline.id);
    command.env("DEPLOYMENT_ID", deployment_id.to_string());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.kill_on_drop(true);

    Ok(PreparedProcess {
        command,
        script,
        pipe_script_to_stdin,
    })
}

/// Expands a leading `~` in a configured working directory
pub fn expand_workdir(workdir: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(workdir).into_owned())
}

/// Transient on-disk script, removed when the guard drops
#[derive(Debug)]
pub struct ScriptFile {
    path: PathBuf,
}

impl ScriptFile {
    pub fn create(
        dir: &Path,
        pipeline_id: &str,
        deployment_id: i64,
        content: &str,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{pipeline_id}-{deployment_id}.sh"));
        std::fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove script file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// In-process leases serializing deployments of one pipeline
///
/// Concurrent triggers of the same pipeline would race on its working
/// directory, so the dispatcher takes a lease before anything is spawned and
/// a second trigger is rejected as busy. The lease is released when the
/// deployment finalizes.
#[derive(Debug, Clone, Default)]
pub struct PipelineLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

impl PipelineLeases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, pipeline_id: &str) -> Option<PipelineLease> {
        let mut held = self.held.lock().unwrap();
        if held.insert(pipeline_id.to_string()) {
            Some(PipelineLease {
                pipeline_id: pipeline_id.to_string(),
                held: Arc::clone(&self.held),
            })
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct PipelineLease {
    pipeline_id: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for PipelineLease {
    fn drop(&mut self) {
        self.held.lock().unwrap().remove(&self.pipeline_id);
    }
}
