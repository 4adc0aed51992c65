//! Workspace folder handling
//!
//! Maps editor workspace folders onto rdm projects. Adding a folder either
//! registers a project rdm already has, or queues a Load task; a changed
//! compilation database location turns into delete-then-reload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::editor::Editor;
use crate::error::ConfigError;
use crate::project::compilation_database::CompilationDatabase;
use crate::project::registry::ProjectRegistry;
use crate::project::scheduler::ProjectTaskScheduler;
use crate::project::task::TaskKind;
use crate::project::publish_project_count;
use crate::rc::{RcCommand, RcExecutor, parse_project_list, query, try_query};

/// What happened to a folder on add
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderOutcome {
    /// rdm already had the project; registered immediately
    Registered,
    /// A Load task was queued
    Loading,
    /// The project was deleted from rdm and a Load task queued
    Reloading,
}

/// Workspace folders and the compilation database each was loaded from
pub struct WorkspaceFolders {
    config: Arc<RwLock<SessionConfig>>,
    executor: Arc<dyn RcExecutor>,
    editor: Arc<dyn Editor>,
    registry: Arc<ProjectRegistry>,
    scheduler: ProjectTaskScheduler,
    /// Folder -> compilation database directory last requested for it
    folders: Mutex<BTreeMap<PathBuf, PathBuf>>,
}

impl WorkspaceFolders {
    pub fn new(
        config: Arc<RwLock<SessionConfig>>,
        executor: Arc<dyn RcExecutor>,
        editor: Arc<dyn Editor>,
        registry: Arc<ProjectRegistry>,
        scheduler: ProjectTaskScheduler,
    ) -> Self {
        Self {
            config,
            executor,
            editor,
            registry,
            scheduler,
            folders: Mutex::new(BTreeMap::new()),
        }
    }

    /// Add several folders; a bad folder is reported and skipped
    pub async fn add_folders(&self, folders: Vec<PathBuf>) {
        for folder in folders {
            if let Err(e) = self.add_folder(folder.clone()).await {
                warn!("Skipping workspace folder {}: {}", folder.display(), e);
                self.editor
                    .show_error(&format!("RTags: {}: {}", folder.display(), e));
            }
        }
    }

    /// Bring one folder under rdm management
    ///
    /// Decision table, with "changed" meaning the compilation database
    /// directory differs from the one this session last used for the folder:
    /// known to rdm and unchanged registers directly, known and changed deletes
    /// the project and reloads it, unknown loads it.
    pub async fn add_folder(&self, folder: PathBuf) -> Result<FolderOutcome, ConfigError> {
        // Intentional .unwrap() - poisoned lock indicates serious bug, panic is appropriate
        let dir = self.config.read().unwrap().compilation_database_dir(&folder)?;
        let database = CompilationDatabase::load(&dir)?;
        info!(
            "Workspace folder {}: {} compilation entries in {}",
            folder.display(),
            database.entry_count(),
            database.path.display()
        );

        let known = try_query(self.executor.as_ref(), RcCommand::ListProjects, &[])
            .await
            .map(|output| parse_project_list(&output).contains(&folder))
            .unwrap_or(false);

        let previous = self
            .folders
            .lock()
            .unwrap()
            .insert(folder.clone(), dir.clone());
        let changed = previous.is_some_and(|previous| previous != dir);

        let outcome = match (known, changed) {
            (true, false) => {
                self.scheduler.cancel_root(&folder);
                if self.registry.add_root(folder.clone()) {
                    publish_project_count(self.editor.as_ref(), &self.registry);
                }
                FolderOutcome::Registered
            }
            (true, true) => {
                info!(
                    "Compilation database for {} moved to {}; reloading",
                    folder.display(),
                    dir.display()
                );
                self.scheduler.cancel_root(&folder);
                query(
                    self.executor.as_ref(),
                    self.editor.as_ref(),
                    RcCommand::DeleteProject {
                        root: folder.clone(),
                    },
                    &[],
                )
                .await;
                if self.registry.remove_root(&folder) {
                    publish_project_count(self.editor.as_ref(), &self.registry);
                }
                self.schedule_load(folder, dir);
                FolderOutcome::Reloading
            }
            (false, _) => {
                self.scheduler.cancel_root(&folder);
                self.schedule_load(folder, dir);
                FolderOutcome::Loading
            }
        };
        Ok(outcome)
    }

    /// Forget a folder: cancel its tasks and unregister its root
    pub fn remove_folder(&self, folder: &Path) {
        self.folders.lock().unwrap().remove(folder);
        let cancelled = self.scheduler.cancel_root(folder);
        let removed = self.registry.remove_root(folder);
        info!(
            "Removed workspace folder {} ({} task(s) cancelled)",
            folder.display(),
            cancelled
        );
        if removed {
            publish_project_count(self.editor.as_ref(), &self.registry);
        }
    }

    /// Re-run the add decision for open folders among `changed`
    pub async fn reload_folders(&self, changed: Vec<PathBuf>) {
        let open: Vec<PathBuf> = {
            let folders = self.folders.lock().unwrap();
            changed
                .into_iter()
                .filter(|folder| folders.contains_key(folder))
                .collect()
        };
        self.add_folders(open).await;
    }

    /// Folders currently open
    pub fn folders(&self) -> Vec<PathBuf> {
        self.folders.lock().unwrap().keys().cloned().collect()
    }

    fn schedule_load(&self, folder: PathBuf, dir: PathBuf) {
        self.scheduler.schedule_task(
            folder,
            TaskKind::Load {
                compilation_database_dir: dir,
            },
        );
    }
}
