//! Editor implementation speaking newline-delimited JSON on stdout
//!
//! Side effects are queued on an unbounded channel and written by a single
//! writer task, so [`Editor`] methods stay synchronous and never interleave
//! partial lines.

use lsp_types::Diagnostic;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Level, error, trace};

use crate::editor::{DocumentStore, Editor};
use crate::log_bridge_message;
use crate::rc::UnsavedFile;

/// One line written to the editor host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notification", rename_all = "camelCase")]
pub enum EditorNotification {
    PublishDiagnostics {
        path: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },
    ClearDiagnostics,
    ShowError {
        message: String,
    },
    ShowInfo {
        message: String,
    },
    PromptReload {
        message: String,
    },
    SetContext {
        key: String,
        value: bool,
    },
    /// Answer to a `willSave` event; the host may now write the file
    WillSaveReady {
        id: u64,
    },
}

/// [`Editor`] backed by the bridge's document store and stdout
pub struct StdioEditor {
    documents: Mutex<DocumentStore>,
    outgoing: mpsc::UnboundedSender<EditorNotification>,
}

impl StdioEditor {
    /// Create the editor and the receiving end for [`spawn_writer`]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EditorNotification>) {
        let (outgoing, incoming) = mpsc::unbounded_channel();
        (
            Self {
                documents: Mutex::new(DocumentStore::new()),
                outgoing,
            },
            incoming,
        )
    }

    /// Mutate document state from bridge events
    pub fn with_documents<R>(&self, f: impl FnOnce(&mut DocumentStore) -> R) -> R {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        f(&mut self.documents.lock().unwrap())
    }

    /// Queue a notification for the host
    pub fn send(&self, notification: EditorNotification) {
        if self.outgoing.send(notification).is_err() {
            trace!("StdioEditor: writer gone, dropping notification");
        }
    }
}

impl Editor for StdioEditor {
    fn unsaved_files(&self) -> Vec<UnsavedFile> {
        self.with_documents(|documents| documents.unsaved_files())
    }

    fn is_open(&self, path: &Path) -> bool {
        self.with_documents(|documents| documents.is_open(path))
    }

    fn is_dirty(&self, path: &Path) -> bool {
        self.with_documents(|documents| documents.is_dirty(path))
    }

    fn set_diagnostics(&self, path: &Path, diagnostics: Vec<Diagnostic>) {
        self.send(EditorNotification::PublishDiagnostics {
            path: path.to_path_buf(),
            diagnostics,
        });
    }

    fn clear_diagnostics(&self) {
        self.send(EditorNotification::ClearDiagnostics);
    }

    fn show_error(&self, message: &str) {
        self.send(EditorNotification::ShowError {
            message: message.to_string(),
        });
    }

    fn show_info(&self, message: &str) {
        self.send(EditorNotification::ShowInfo {
            message: message.to_string(),
        });
    }

    fn prompt_reload(&self, message: &str) {
        self.send(EditorNotification::PromptReload {
            message: message.to_string(),
        });
    }

    fn set_context(&self, key: &str, value: bool) {
        self.send(EditorNotification::SetContext {
            key: key.to_string(),
            value,
        });
    }
}

/// Write queued notifications as JSON lines until every sender is gone
pub fn spawn_writer<W>(
    mut incoming: mpsc::UnboundedReceiver<EditorNotification>,
    mut writer: W,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(notification) = incoming.recv().await {
            let mut line = match serde_json::to_string(&notification) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to serialize notification: {}", e);
                    continue;
                }
            };
            log_bridge_message!(Level::TRACE, "outgoing", &line);
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                error!("Failed to write to editor host: {}", e);
                break;
            }
            let _ = writer.flush().await;
        }
    })
}
