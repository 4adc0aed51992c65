//! Stdio bridge to the editor host
//!
//! The host writes one JSON event per line on stdin and reads one JSON
//! notification per line from stdout (see [`EditorNotification`]). Events are
//! handled strictly in arrival order; `willSave` is answered with
//! `willSaveReady` once the save may proceed.
//!
//! ```text
//! {"event":"initialize","folders":["/ws"],"settings":{"diagnostics":{"openFilesOnly":true}}}
//! {"event":"didChange","path":"/ws/a.cpp","text":"int main() {}"}
//! {"event":"willSave","id":1,"path":"/ws/a.cpp"}
//! {"event":"command","command":"reindexActiveProject","path":"/ws/a.cpp"}
//! ```

use serde::Deserialize;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tracing::{Level, debug, info, warn};

use crate::config::{SessionConfig, SessionConfigBuilder, Settings};
use crate::diagnostics::{DiagnosticsLauncher, RcDiagnosticsLauncher};
use crate::editor::stdio::spawn_writer;
use crate::editor::{Editor, EditorNotification, StdioEditor};
use crate::error::ConfigError;
use crate::log_bridge_message;
use crate::rc::{ProcessRcExecutor, RcExecutor};
use crate::session::RtagsSession;

/// How long queued notifications may take to drain on exit
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Protocol
// ============================================================================

/// One line read from the editor host
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BridgeEvent {
    Initialize {
        #[serde(default)]
        folders: Vec<PathBuf>,
        settings: Option<Settings>,
    },
    WorkspaceFoldersChanged {
        #[serde(default)]
        added: Vec<PathBuf>,
        #[serde(default)]
        removed: Vec<PathBuf>,
    },
    DidOpen {
        path: PathBuf,
        #[serde(default)]
        text: String,
    },
    /// Carries the full document text
    DidChange { path: PathBuf, text: String },
    WillSave { id: u64, path: PathBuf },
    DidSave { path: PathBuf },
    DidClose { path: PathBuf },
    Command {
        command: BridgeCommand,
        /// Active document, for commands that need one
        path: Option<PathBuf>,
    },
    ConfigurationChanged { settings: Settings },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BridgeCommand {
    ReindexActiveProject,
    ReindexAllProjects,
}

// ============================================================================
// Backend wiring
// ============================================================================

/// rc executor and diagnostics launcher for a session
pub struct Backend {
    pub executor: Arc<dyn RcExecutor>,
    pub launcher: Arc<dyn DiagnosticsLauncher>,
}

pub type BackendFactory = Box<dyn Fn(&SessionConfig) -> Backend + Send + Sync>;

/// Real rc processes
pub fn process_backend(config: &SessionConfig) -> Backend {
    Backend {
        executor: Arc::new(ProcessRcExecutor::new(
            config.rc_executable.clone(),
            config.timings.query_timeout,
        )),
        launcher: Arc::new(RcDiagnosticsLauncher::new(config.rc_executable.clone())),
    }
}

/// Values used where the editor's settings leave a gap
#[derive(Debug, Clone, Default)]
pub struct BridgeDefaults {
    /// From `--rc-path` or `RC_PATH`
    pub rc_executable: Option<String>,
    /// From `--rdm-path` or `RDM_PATH`
    pub rdm_executable: Option<String>,
    /// From `--settings`, used when `initialize` carries none
    pub settings: Settings,
}

impl BridgeDefaults {
    /// Editor settings win over command-line and environment values
    pub fn session_config(&self, settings: &Settings) -> Result<SessionConfig, ConfigError> {
        let mut builder = SessionConfigBuilder::from_settings(settings);
        if settings.rc_executable.is_none()
            && let Some(rc) = &self.rc_executable
        {
            builder = builder.rc_executable(rc.clone());
        }
        if settings.rdm_executable.is_none()
            && let Some(rdm) = &self.rdm_executable
        {
            builder = builder.rdm_executable(rdm.clone());
        }
        builder.build()
    }
}

// ============================================================================
// Event dispatch
// ============================================================================

pub struct Bridge {
    editor: Arc<StdioEditor>,
    defaults: BridgeDefaults,
    backend: BackendFactory,
    session: Option<RtagsSession>,
}

impl Bridge {
    pub fn new(editor: Arc<StdioEditor>, defaults: BridgeDefaults, backend: BackendFactory) -> Self {
        Self {
            editor,
            defaults,
            backend,
            session: None,
        }
    }

    /// Handle one raw line; malformed lines are logged and skipped
    pub async fn handle_line(&mut self, line: &str) -> ControlFlow<()> {
        log_bridge_message!(Level::TRACE, "incoming", line);
        match serde_json::from_str::<BridgeEvent>(line) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                warn!("Bridge: ignoring malformed event: {}", e);
                ControlFlow::Continue(())
            }
        }
    }

    pub async fn handle_event(&mut self, event: BridgeEvent) -> ControlFlow<()> {
        match event {
            BridgeEvent::Initialize { folders, settings } => {
                self.initialize(folders, settings).await;
            }
            BridgeEvent::WorkspaceFoldersChanged { added, removed } => {
                if let Some(session) = self.session() {
                    session.workspace_folders_changed(added, removed).await;
                }
            }
            BridgeEvent::DidOpen { path, text } => {
                self.editor
                    .with_documents(|documents| documents.open(path.clone(), text));
                if let Some(session) = self.session() {
                    session.did_open(&path).await;
                }
            }
            BridgeEvent::DidChange { path, text } => {
                self.editor
                    .with_documents(|documents| documents.change(path.clone(), text));
                if let Some(session) = self.session() {
                    session.did_change(&path);
                }
            }
            BridgeEvent::WillSave { id, path } => {
                if let Some(session) = self.session() {
                    session.will_save(&path).await;
                }
                self.editor.send(EditorNotification::WillSaveReady { id });
            }
            BridgeEvent::DidSave { path } => {
                self.editor.with_documents(|documents| documents.save(&path));
                if let Some(session) = self.session() {
                    session.did_save(&path).await;
                }
            }
            BridgeEvent::DidClose { path } => {
                self.editor.with_documents(|documents| documents.close(&path));
                if let Some(session) = self.session() {
                    session.did_close(&path);
                }
            }
            BridgeEvent::Command { command, path } => {
                if let Some(session) = self.session() {
                    match command {
                        BridgeCommand::ReindexActiveProject => {
                            session.reindex_active_project(path.as_deref());
                        }
                        BridgeCommand::ReindexAllProjects => {
                            session.reindex_all_projects();
                        }
                    }
                }
            }
            BridgeEvent::ConfigurationChanged { settings } => {
                match self.defaults.session_config(&settings) {
                    Ok(config) => {
                        if let Some(session) = self.session() {
                            session.configuration_changed(config).await;
                        }
                    }
                    Err(e) => self.editor.show_error(&format!("RTags: {}", e)),
                }
            }
            BridgeEvent::Shutdown => {
                info!("Bridge: shutdown requested");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn initialize(&mut self, folders: Vec<PathBuf>, settings: Option<Settings>) {
        if self.session.is_some() {
            warn!("Bridge: ignoring repeated initialize");
            return;
        }
        let settings = settings.unwrap_or_else(|| self.defaults.settings.clone());
        let config = self.defaults.session_config(&settings).unwrap_or_else(|e| {
            self.editor
                .show_error(&format!("RTags: {}; using default settings", e));
            SessionConfig::default()
        });
        info!(
            "Bridge: starting session for {} folder(s) with rc={} rdm={}",
            folders.len(),
            config.rc_executable,
            config.rdm_executable
        );

        let backend = (self.backend)(&config);
        let editor: Arc<dyn Editor> = self.editor.clone();
        self.session = Some(
            RtagsSession::start(config, backend.executor, editor, backend.launcher, folders).await,
        );
    }

    fn session(&self) -> Option<&RtagsSession> {
        if self.session.is_none() {
            debug!("Bridge: event before initialize ignored");
        }
        self.session.as_ref()
    }

    /// Dispose the session, if one was started
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.dispose().await;
        }
    }
}

/// Serve one editor host until `shutdown` or end of input
pub async fn run<R, W>(
    reader: R,
    writer: W,
    defaults: BridgeDefaults,
    backend: BackendFactory,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (editor, incoming) = StdioEditor::new();
    let writer_task = spawn_writer(incoming, writer);
    let mut bridge = Bridge::new(Arc::new(editor), defaults, backend);

    let mut lines = BufReader::new(reader).lines();
    let result = loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                if bridge.handle_line(&line).await.is_break() {
                    break Ok(());
                }
            }
            Ok(None) => {
                info!("Bridge: editor host closed stdin");
                break Ok(());
            }
            Err(e) => break Err(e),
        }
    };

    bridge.shutdown().await;
    drop(bridge);
    if tokio::time::timeout(FLUSH_TIMEOUT, writer_task).await.is_err() {
        warn!("Bridge: notifications still queued after {:?}", FLUSH_TIMEOUT);
    }
    result
}
