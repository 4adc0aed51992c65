//! File Change Coordinator
//!
//! Turns editor document events into rc reindex calls. Edits are debounced per
//! file. Saves go through a suspend/resume handshake with rdm's file watch so
//! the watch-triggered reindex does not race the one we issue ourselves.
//!
//! ```text
//! didChange --debounce--> resume pending, --reindex <file>
//! willSave  --> cancel debounce, --suspend <file> on   (bounded wait)
//! didSave   --> resume pending, --suspend <file> off, --reindex | --check-reindex
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::editor::Editor;
use crate::project::{ProjectRegistry, unsaved_files_in_project};
use crate::rc::{RcCommand, RcExecutor, UnsavedFile, query, try_query};
use crate::session::debounce::KeyedDebouncer;

struct CoordinatorInner {
    executor: Arc<dyn RcExecutor>,
    editor: Arc<dyn Editor>,
    registry: Arc<ProjectRegistry>,
    diagnostics_enabled: bool,
    suspend_timeout: Duration,
    /// Per-file reindex debounce
    reindex: KeyedDebouncer<PathBuf>,
    /// Resume timers for saves that produce no didSave
    fallback: KeyedDebouncer<PathBuf>,
    /// Files whose watch we suspended and have not resumed yet
    suspended: Mutex<HashSet<PathBuf>>,
}

#[derive(Clone)]
pub struct FileChangeCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl FileChangeCoordinator {
    pub fn new(
        executor: Arc<dyn RcExecutor>,
        editor: Arc<dyn Editor>,
        registry: Arc<ProjectRegistry>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                executor,
                editor,
                registry,
                diagnostics_enabled: config.diagnostics_enabled,
                suspend_timeout: config.timings.suspend_timeout,
                reindex: KeyedDebouncer::new(config.timings.reindex_delay),
                fallback: KeyedDebouncer::new(config.timings.resume_fallback_delay),
                suspended: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Document content changed: (re)start the file's debounce timer
    pub fn on_did_change(&self, path: &Path) {
        let Some(root) = self.inner.registry.get_project_root(path) else {
            return;
        };
        let coordinator = self.clone();
        let file = path.to_path_buf();
        self.inner
            .reindex
            .schedule(path.to_path_buf(), move || async move {
                coordinator.reindex_changed(&root, &file).await;
            });
    }

    async fn reindex_changed(&self, root: &Path, path: &Path) {
        self.resume_pending(root, None).await;
        debug!("FileChangeCoordinator: reindexing {}", path.display());
        let unsaved = self.unsaved_in(root);
        query(
            self.inner.executor.as_ref(),
            self.inner.editor.as_ref(),
            RcCommand::ReindexFile {
                path: path.to_path_buf(),
            },
            &unsaved,
        )
        .await;
    }

    /// About to write `path` to disk; returns once the save may proceed
    ///
    /// Never waits longer than the suspend timeout.
    pub async fn on_will_save(&self, path: &Path) {
        let inner = &self.inner;
        inner.reindex.cancel(&path.to_path_buf());

        let Some(root) = inner.registry.get_project_root(path) else {
            return;
        };

        let others_unsaved = self
            .unsaved_in(&root)
            .iter()
            .any(|file| file.path != path);
        if !others_unsaved {
            debug!(
                "FileChangeCoordinator: no other unsaved files in {}, not suspending {}",
                root.display(),
                path.display()
            );
            return;
        }

        let dirty = inner.editor.is_dirty(path);
        if tokio::time::timeout(inner.suspend_timeout, self.suspend(path))
            .await
            .is_err()
        {
            debug!(
                "FileChangeCoordinator: suspend of {} timed out, saving anyway",
                path.display()
            );
        }

        // A save without modifications gets no didSave to resume the watch
        if !dirty && self.is_suspended(path) {
            let coordinator = self.clone();
            let file = path.to_path_buf();
            inner
                .fallback
                .schedule(path.to_path_buf(), move || async move {
                    debug!("FileChangeCoordinator: fallback resume of {}", file.display());
                    coordinator.resume(&file).await;
                });
        }
    }

    /// `path` was written to disk
    pub async fn on_did_save(&self, path: &Path) {
        let Some(root) = self.inner.registry.get_project_root(path) else {
            return;
        };
        self.resume_pending(&root, Some(path)).await;

        // rdm's staleness check is unreliable for a file whose watch was suspended
        let command = if self.resume(path).await {
            RcCommand::ReindexFile {
                path: path.to_path_buf(),
            }
        } else {
            RcCommand::CheckReindex {
                path: path.to_path_buf(),
            }
        };
        let unsaved = self.unsaved_in(&root);
        query(
            self.inner.executor.as_ref(),
            self.inner.editor.as_ref(),
            command,
            &unsaved,
        )
        .await;
    }

    /// Ask rdm for a fresh diagnostics batch for a newly opened file
    pub async fn on_did_open(&self, path: &Path) {
        if !self.inner.diagnostics_enabled || !self.inner.registry.is_in_project(path, None) {
            return;
        }
        try_query(
            self.inner.executor.as_ref(),
            RcCommand::Diagnose {
                path: path.to_path_buf(),
            },
            &[],
        )
        .await;
    }

    /// A closed document has nothing left to debounce
    pub fn on_did_close(&self, path: &Path) {
        self.inner.reindex.cancel(&path.to_path_buf());
    }

    /// Suspend rdm's file watch for `path`
    ///
    /// Returns false without calling rc when the file is already suspended.
    /// The file counts as suspended from the moment the call is issued, so a
    /// call cut short by the save timeout is still resumed later.
    pub async fn suspend(&self, path: &Path) -> bool {
        if !self.inner.suspended.lock().unwrap().insert(path.to_path_buf()) {
            return false;
        }
        info!("FileChangeCoordinator: suspending file watch for {}", path.display());
        try_query(
            self.inner.executor.as_ref(),
            RcCommand::Suspend {
                path: path.to_path_buf(),
                on: true,
                timeout: Some(self.inner.suspend_timeout),
            },
            &[],
        )
        .await;
        true
    }

    /// Resume rdm's file watch for `path`; returns whether it was suspended
    ///
    /// A file that was never suspended is left alone.
    pub async fn resume(&self, path: &Path) -> bool {
        if !self.inner.suspended.lock().unwrap().remove(path) {
            return false;
        }
        self.inner.fallback.cancel(&path.to_path_buf());
        info!("FileChangeCoordinator: resuming file watch for {}", path.display());
        try_query(
            self.inner.executor.as_ref(),
            RcCommand::Suspend {
                path: path.to_path_buf(),
                on: false,
                timeout: None,
            },
            &[],
        )
        .await;
        true
    }

    fn unsaved_in(&self, root: &Path) -> Vec<UnsavedFile> {
        unsaved_files_in_project(self.inner.editor.as_ref(), &self.inner.registry, root)
    }

    /// Resume every suspended file of the project at `root` other than `except`
    pub async fn resume_pending(&self, root: &Path, except: Option<&Path>) {
        let pending: Vec<PathBuf> = self
            .inner
            .suspended
            .lock()
            .unwrap()
            .iter()
            .filter(|path| {
                Some(path.as_path()) != except
                    && self.inner.registry.is_in_project(path, Some(root))
            })
            .cloned()
            .collect();
        for path in pending {
            self.resume(&path).await;
        }
    }

    pub fn is_suspended(&self, path: &Path) -> bool {
        self.inner.suspended.lock().unwrap().contains(path)
    }

    pub fn reindex_pending(&self, path: &Path) -> bool {
        self.inner.reindex.pending(&path.to_path_buf())
    }

    /// Cancel all timers
    pub fn dispose(&self) {
        self.inner.reindex.dispose();
        self.inner.fallback.dispose();
    }
}
