//! Project management
//!
//! The registry of rdm projects, the serialized Load/Reindex task queue that
//! feeds it, and the mapping from editor workspace folders onto both.

pub mod compilation_database;
pub mod registry;
pub mod scheduler;
pub mod task;
pub mod workspace;

pub use registry::ProjectRegistry;
pub use scheduler::ProjectTaskScheduler;
pub use task::TaskKind;
pub use workspace::WorkspaceFolders;

use std::path::Path;

use crate::editor::{Editor, MULTIPLE_PROJECTS_CONTEXT};
use crate::rc::UnsavedFile;

/// Tell the editor whether more than one project is registered
pub fn publish_project_count(editor: &dyn Editor, registry: &ProjectRegistry) {
    editor.set_context(MULTIPLE_PROJECTS_CONTEXT, registry.len() > 1);
}

/// Unsaved files owned by the project at `root`
///
/// Files under a nested project root belong to that project, not to `root`.
pub fn unsaved_files_in_project(
    editor: &dyn Editor,
    registry: &ProjectRegistry,
    root: &Path,
) -> Vec<UnsavedFile> {
    editor
        .unsaved_files()
        .into_iter()
        .filter(|file| registry.is_in_project(&file.path, Some(root)))
        .collect()
}
