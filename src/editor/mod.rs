//! Editor seam
//!
//! The engine never talks to a UI directly. It reads document state and pushes
//! side effects through [`Editor`]; the stdio bridge implements it by writing
//! JSON notifications, tests implement it by recording.

pub mod documents;
pub mod stdio;

#[cfg(test)]
pub mod testing;

use lsp_types::Diagnostic;
use std::path::Path;

use crate::rc::UnsavedFile;

pub use documents::DocumentStore;
pub use stdio::{EditorNotification, StdioEditor};

/// Context key toggled when more than one project root is registered
pub const MULTIPLE_PROJECTS_CONTEXT: &str = "rtags.multipleProjects";

/// What the engine needs from the editor
pub trait Editor: Send + Sync {
    /// Open documents with modifications not yet on disk
    fn unsaved_files(&self) -> Vec<UnsavedFile>;

    /// Whether a document is open
    fn is_open(&self, path: &Path) -> bool;

    /// Whether an open document has unsaved modifications
    fn is_dirty(&self, path: &Path) -> bool;

    /// Replace the diagnostics shown for `path`
    fn set_diagnostics(&self, path: &Path, diagnostics: Vec<Diagnostic>);

    /// Drop every diagnostic the engine published
    fn clear_diagnostics(&self);

    fn show_error(&self, message: &str);

    fn show_info(&self, message: &str);

    /// Actionable notification asking the user to reload the editor window
    fn prompt_reload(&self, message: &str);

    /// Toggle a contribution visibility flag
    fn set_context(&self, key: &str, value: bool);
}
