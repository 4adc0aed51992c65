//! One-shot `rc` execution
//!
//! [`RcExecutor`] is the seam every component talks to. [`ProcessRcExecutor`]
//! spawns the real client, streaming unsaved buffers on stdin.
//!
//! Callers normally go through [`query`] or [`try_query`], which return
//! `Option<String>`: `None` is the ordinary failure channel here, not a
//! degenerate case. `query` also tells the user, `try_query` only logs.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{Level, debug, trace, warn};

use crate::editor::Editor;
use crate::error::RcError;
use crate::log_timing;
use crate::rc::command::{RcCommand, UnsavedFile};

/// Runs `rc` invocations
#[async_trait]
pub trait RcExecutor: Send + Sync {
    /// Run `command`, feeding `unsaved` buffers to rc, and return its stdout
    async fn execute(
        &self,
        command: &RcCommand,
        unsaved: &[UnsavedFile],
    ) -> Result<String, RcError>;
}

/// Executor backed by the real `rc` binary
pub struct ProcessRcExecutor {
    program: String,
    timeout: Duration,
}

impl ProcessRcExecutor {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl RcExecutor for ProcessRcExecutor {
    async fn execute(
        &self,
        command: &RcCommand,
        unsaved: &[UnsavedFile],
    ) -> Result<String, RcError> {
        let args = command.args_with_unsaved(unsaved);
        trace!("ProcessRcExecutor: {} {:?}", self.program, args);
        let started = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(if unsaved.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RcError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Fed alongside the wait: rc may not drain stdin before exiting or timing out
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                for file in unsaved {
                    stdin.write_all(&file.content).await?;
                }
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (fed, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| RcError::timeout(&args, self.timeout))?;
        if let Err(e) = fed {
            debug!("ProcessRcExecutor: unsaved buffers not fully written: {}", e);
        }
        let output = output?;

        log_timing!(Level::TRACE, "rc", started.elapsed());

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            // rc reports most failures on stdout
            let message = if stderr.is_empty() { stdout } else { stderr };
            return Err(RcError::failed(&args, output.status.code(), message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Run a command, reporting failure to the user
pub async fn query(
    executor: &dyn RcExecutor,
    editor: &dyn Editor,
    command: RcCommand,
    unsaved: &[UnsavedFile],
) -> Option<String> {
    match executor.execute(&command, unsaved).await {
        Ok(output) => Some(output),
        Err(e) => {
            warn!("rc call failed: {}", e);
            editor.show_error(&format!("RTags: {}", e));
            None
        }
    }
}

/// Run a best-effort command, logging failure only
pub async fn try_query(
    executor: &dyn RcExecutor,
    command: RcCommand,
    unsaved: &[UnsavedFile],
) -> Option<String> {
    match executor.execute(&command, unsaved).await {
        Ok(output) => Some(output),
        Err(e) => {
            debug!("rc call failed (ignored): {}", e);
            None
        }
    }
}
