//! Diagnostics Stream Processor
//!
//! Supervises the long-lived `rc --diagnostics --json` process, frames its
//! stdout into lines and publishes each file's batch to the editor. The
//! supervisor is a single task: launch, pump until EOF, then either stop (on
//! dispose) or clear everything, report, back off and launch again.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::diagnostics::framing::LineFraming;
use crate::diagnostics::parse::parse_line;
use crate::editor::Editor;
use crate::io::{ChildProcessManager, ProcessError, ProcessManager, StderrMonitor};
use crate::project::ProjectRegistry;
use crate::rc::RcCommand;

const READ_CHUNK_SIZE: usize = 8192;

// ============================================================================
// Launcher seam
// ============================================================================

/// A running diagnostics producer
pub struct DiagnosticsProcess {
    /// Newline-delimited JSON; EOF means the producer is gone
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    /// Backing process, killed when dropped
    pub process: Option<ChildProcessManager>,
}

/// Starts the diagnostics producer
#[async_trait]
pub trait DiagnosticsLauncher: Send + Sync {
    async fn launch(&self) -> Result<DiagnosticsProcess, ProcessError>;
}

/// Launches `rc --diagnostics --json`
pub struct RcDiagnosticsLauncher {
    rc_executable: String,
}

impl RcDiagnosticsLauncher {
    pub fn new(rc_executable: impl Into<String>) -> Self {
        Self {
            rc_executable: rc_executable.into(),
        }
    }
}

#[async_trait]
impl DiagnosticsLauncher for RcDiagnosticsLauncher {
    async fn launch(&self) -> Result<DiagnosticsProcess, ProcessError> {
        let mut manager = ChildProcessManager::new(
            self.rc_executable.clone(),
            RcCommand::DiagnosticsStream.args(),
            None,
        );
        manager.on_stderr_line(|line| debug!(target: "rc_diagnostics", "{}", line));
        manager.start().await?;
        let stdout = manager.take_stdout()?;
        info!("DiagnosticsStreamProcessor: started {}", manager.command_line());
        Ok(DiagnosticsProcess {
            stdout: Box::new(stdout),
            process: Some(manager),
        })
    }
}

// ============================================================================
// Stream processor
// ============================================================================

struct ProcessorInner {
    launcher: Arc<dyn DiagnosticsLauncher>,
    editor: Arc<dyn Editor>,
    registry: Arc<ProjectRegistry>,
    open_files_only: bool,
    restart_backoff: Duration,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct DiagnosticsStreamProcessor {
    inner: Arc<ProcessorInner>,
}

/// How a producer's stream ended
enum StreamEnd {
    Disposed,
    Exited,
}

impl DiagnosticsStreamProcessor {
    pub fn new(
        launcher: Arc<dyn DiagnosticsLauncher>,
        editor: Arc<dyn Editor>,
        registry: Arc<ProjectRegistry>,
        open_files_only: bool,
        restart_backoff: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessorInner {
                launcher,
                editor,
                registry,
                open_files_only,
                restart_backoff,
                shutdown: CancellationToken::new(),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Start the supervisor task; later calls and calls after dispose do nothing
    pub fn start(&self) -> bool {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let mut supervisor = self.inner.supervisor.lock().unwrap();
        if supervisor.is_some() || self.inner.shutdown.is_cancelled() {
            return false;
        }
        let processor = self.clone();
        *supervisor = Some(tokio::spawn(async move { processor.supervise().await }));
        true
    }

    /// Whether the supervisor is still alive
    pub fn is_active(&self) -> bool {
        self.inner
            .supervisor
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Kill the producer and stop for good, leaving published diagnostics alone
    pub fn dispose(&self) {
        self.inner.shutdown.cancel();
    }

    async fn supervise(&self) {
        let inner = &self.inner;
        loop {
            let launched = tokio::select! {
                _ = inner.shutdown.cancelled() => return,
                launched = inner.launcher.launch() => launched,
            };
            let mut producer = match launched {
                Ok(producer) => producer,
                Err(e) => {
                    error!("DiagnosticsStreamProcessor: failed to start: {}", e);
                    inner.editor.show_error(&format!(
                        "RTags: could not start the diagnostics process: {}",
                        e
                    ));
                    return;
                }
            };

            let end = tokio::select! {
                _ = inner.shutdown.cancelled() => StreamEnd::Disposed,
                _ = self.pump(producer.stdout.as_mut()) => StreamEnd::Exited,
            };

            if let Some(mut process) = producer.process.take() {
                process.kill_sync();
            }
            if matches!(end, StreamEnd::Disposed) || inner.shutdown.is_cancelled() {
                info!("DiagnosticsStreamProcessor: stopped");
                return;
            }

            warn!(
                "DiagnosticsStreamProcessor: diagnostics process exited, restarting in {:?}",
                inner.restart_backoff
            );
            inner.editor.clear_diagnostics();
            inner.editor.show_error(&format!(
                "RTags: diagnostics process exited unexpectedly, restarting in {}s",
                inner.restart_backoff.as_secs()
            ));

            tokio::select! {
                _ = inner.shutdown.cancelled() => return,
                _ = tokio::time::sleep(inner.restart_backoff) => {}
            }
        }
    }

    /// Read until EOF or a read error
    async fn pump(&self, stdout: &mut (dyn AsyncRead + Send + Unpin)) {
        let mut framing = LineFraming::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) => return,
                Ok(n) => {
                    for line in framing.push(&chunk[..n]) {
                        self.handle_line(&line);
                    }
                }
                Err(e) => {
                    warn!("DiagnosticsStreamProcessor: read failed: {}", e);
                    return;
                }
            }
        }
    }

    fn handle_line(&self, line: &str) {
        let batches = match parse_line(line) {
            Ok(batches) => batches,
            Err(e) => {
                warn!("DiagnosticsStreamProcessor: skipping line: {}", e);
                self.inner
                    .editor
                    .show_error(&format!("RTags: ignored diagnostics output: {}", e));
                return;
            }
        };
        for (path, diagnostics) in batches {
            if !self.accepts(&path) {
                debug!(
                    "DiagnosticsStreamProcessor: ignoring {} diagnostic(s) for {}",
                    diagnostics.len(),
                    path.display()
                );
                continue;
            }
            self.inner.editor.set_diagnostics(&path, diagnostics);
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        let inner = &self.inner;
        let known = inner.registry.is_in_project(path, None)
            || inner.registry.is_in_loading_project(path);
        known && (!inner.open_files_only || inner.editor.is_open(path))
    }
}
