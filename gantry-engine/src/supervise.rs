//! Process supervisor
//!
//! Spawns the prepared invocation, pumps its output into the fan-out channel,
//! and enforces the wall-clock deadline with SIGTERM then SIGKILL. A process
//! that was timed out is reported as such no matter how it exits afterwards.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::mpsc;

use gantry_core::domain::event::LogStream;

use crate::dispatch::PreparedProcess;
use crate::error::EngineError;
use crate::fanout::OutputChunk;

/// Window between the graceful and the forceful kill
const KILL_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Terminal state of one supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Process ran to completion with this exit code
    Exited(i32),
    /// Deadline hit; process was terminated
    TimedOut,
    /// Process never started or could not be awaited
    Errored(String),
}

/// Runs one prepared process to its terminal state
///
/// Output chunks and the timeout notice are delivered through `tx` in
/// production order. The scratch script file is removed when this returns,
/// whichever path was taken.
pub async fn supervise(
    mut prepared: PreparedProcess,
    script_text: &str,
    timeout: Duration,
    tx: mpsc::Sender<OutputChunk>,
) -> Outcome {
    let mut child = match prepared.command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return Outcome::Errored(EngineError::Spawn(e.to_string()).to_string());
        }
    };

    if prepared.pipe_script_to_stdin {
        if let Some(mut stdin) = child.stdin.take() {
            let script = script_text.as_bytes().to_vec();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&script).await {
                    tracing::warn!("Failed to stream script to remote shell: {}", e);
                }
                // Dropping stdin closes the pipe so the remote bash sees EOF
            });
        }
    }

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump_stream(
            stdout,
            LogStream::Stdout,
            tx.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump_stream(
            stderr,
            LogStream::Stderr,
            tx.clone(),
        )));
    }

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => Outcome::Exited(status.code().unwrap_or(-1)),
            Err(e) => Outcome::Errored(format!("Failed to wait for pipeline process: {e}")),
        },
        _ = tokio::time::sleep(timeout) => {
            let notice = format!(
                "\nERROR: Pipeline timed out after {}. Terminating process...\n",
                timeout_label(timeout)
            );
            let _ = tx
                .send(OutputChunk { stream: LogStream::Stderr, data: notice })
                .await;
            terminate(&mut child).await;
            Outcome::TimedOut
        }
    };

    // Pipes close once the process is gone; wait for the tail of the output
    for reader in readers {
        let _ = reader.await;
    }

    drop(prepared.script);

    outcome
}

/// SIGTERM, a short grace window, then SIGKILL
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }

    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        if let Err(e) = child.kill().await {
            tracing::warn!("Failed to kill timed out process: {}", e);
        }
    }
}

async fn pump_stream<R: AsyncRead + Unpin>(
    mut reader: R,
    stream: LogStream,
    tx: mpsc::Sender<OutputChunk>,
) {
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(OutputChunk { stream, data }).await.is_err() {
                    break;
                }
            }
        }
    }
}

fn timeout_label(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{} seconds", secs)
    }
}
