//! RTags session
//!
//! [`RtagsSession`] is the single owner of every engine component for one
//! editor window: registry, task scheduler, workspace folders, file change
//! coordinator, diagnostics stream and the rdm supervisor. It is built by
//! [`RtagsSession::start`] and torn down by [`RtagsSession::dispose`].

pub mod debounce;
pub mod file_changes;

pub use file_changes::FileChangeCoordinator;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::diagnostics::{DiagnosticsLauncher, DiagnosticsStreamProcessor};
use crate::editor::Editor;
use crate::project::{
    ProjectRegistry, ProjectTaskScheduler, TaskKind, WorkspaceFolders, publish_project_count,
};
use crate::rc::{DaemonSupervisor, RcExecutor};

pub struct RtagsSession {
    config: Arc<RwLock<SessionConfig>>,
    editor: Arc<dyn Editor>,
    registry: Arc<ProjectRegistry>,
    scheduler: ProjectTaskScheduler,
    workspace: WorkspaceFolders,
    file_changes: FileChangeCoordinator,
    diagnostics: Option<DiagnosticsStreamProcessor>,
    daemon: DaemonSupervisor,
}

impl RtagsSession {
    /// Connect to rdm, open `folders` and start the diagnostics stream
    ///
    /// Nothing here is fatal: an unreachable rdm is reported and the session
    /// comes up without diagnostics, every rc call then fails individually.
    pub async fn start(
        config: SessionConfig,
        executor: Arc<dyn RcExecutor>,
        editor: Arc<dyn Editor>,
        launcher: Arc<dyn DiagnosticsLauncher>,
        folders: Vec<PathBuf>,
    ) -> Self {
        let registry = Arc::new(ProjectRegistry::new());
        let scheduler = ProjectTaskScheduler::new(
            Arc::clone(&executor),
            Arc::clone(&editor),
            Arc::clone(&registry),
            config.timings.indexing_poll_interval,
        );
        let file_changes = FileChangeCoordinator::new(
            Arc::clone(&executor),
            Arc::clone(&editor),
            Arc::clone(&registry),
            &config,
        );
        let daemon = DaemonSupervisor::new(
            config.rdm_executable.clone(),
            config.rdm_arguments.clone(),
            config.auto_launch_rdm,
            config.timings.daemon_startup_timeout,
        );

        let connected = match daemon.ensure_running(executor.as_ref()).await {
            Ok(status) => {
                info!("RtagsSession: rdm {:?}", status);
                true
            }
            Err(e) => {
                warn!("RtagsSession: {}", e);
                editor.show_error(&format!("RTags: {}", e));
                false
            }
        };

        let diagnostics = (config.diagnostics_enabled && connected).then(|| {
            let processor = DiagnosticsStreamProcessor::new(
                launcher,
                Arc::clone(&editor),
                Arc::clone(&registry),
                config.diagnostics_open_files_only,
                config.timings.diagnostics_restart_backoff,
            );
            processor.start();
            processor
        });

        let config = Arc::new(RwLock::new(config));
        let workspace = WorkspaceFolders::new(
            Arc::clone(&config),
            executor,
            Arc::clone(&editor),
            Arc::clone(&registry),
            scheduler.clone(),
        );

        publish_project_count(editor.as_ref(), &registry);
        workspace.add_folders(folders).await;

        Self {
            config,
            editor,
            registry,
            scheduler,
            workspace,
            file_changes,
            diagnostics,
            daemon,
        }
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &ProjectTaskScheduler {
        &self.scheduler
    }

    pub fn diagnostics_active(&self) -> bool {
        self.diagnostics
            .as_ref()
            .is_some_and(DiagnosticsStreamProcessor::is_active)
    }

    // ========================================================================
    // Document events
    // ========================================================================

    pub async fn did_open(&self, path: &Path) {
        self.file_changes.on_did_open(path).await;
    }

    pub fn did_change(&self, path: &Path) {
        self.file_changes.on_did_change(path);
    }

    pub async fn will_save(&self, path: &Path) {
        self.file_changes.on_will_save(path).await;
    }

    pub async fn did_save(&self, path: &Path) {
        self.file_changes.on_did_save(path).await;
    }

    pub fn did_close(&self, path: &Path) {
        self.file_changes.on_did_close(path);
    }

    // ========================================================================
    // Workspace and configuration
    // ========================================================================

    pub async fn workspace_folders_changed(&self, added: Vec<PathBuf>, removed: Vec<PathBuf>) {
        for folder in &removed {
            self.workspace.remove_folder(folder);
        }
        self.workspace.add_folders(added).await;
    }

    /// Apply new settings
    ///
    /// Executable, daemon and diagnostics settings are read once at start, so
    /// changing them only prompts for a reload. A changed compilation database
    /// override reloads the affected folders right away.
    pub async fn configuration_changed(&self, new: SessionConfig) {
        let (reload_required, changed_folders) = {
            // Intentional .unwrap() - poisoned lock indicates serious bug, panic is appropriate
            let mut config = self.config.write().unwrap();
            let reload_required = config.reload_required(&new);
            let changed_folders = config.changed_overrides(&new);
            *config = new;
            (reload_required, changed_folders)
        };

        if !reload_required.is_empty() {
            info!(
                "RtagsSession: settings changed that need a reload: {}",
                reload_required.join(", ")
            );
            self.editor.prompt_reload(&format!(
                "RTags: reload the window to apply changes to {}",
                reload_required.join(", ")
            ));
        }
        if !changed_folders.is_empty() {
            self.workspace.reload_folders(changed_folders).await;
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Reindex the project owning the active document
    pub fn reindex_active_project(&self, active: Option<&Path>) -> Option<Uuid> {
        let root = active.and_then(|path| self.registry.get_project_root(path));
        let Some(root) = root else {
            self.editor
                .show_info("RTags: the active document is not part of an indexed project");
            return None;
        };
        Some(self.scheduler.schedule_task(root, TaskKind::Reindex))
    }

    /// Reindex every registered project, in registration order
    pub fn reindex_all_projects(&self) -> Vec<Uuid> {
        let roots = self.registry.roots();
        if roots.is_empty() {
            self.editor.show_info("RTags: no indexed projects");
        }
        roots
            .into_iter()
            .map(|root| self.scheduler.schedule_task(root, TaskKind::Reindex))
            .collect()
    }

    /// Release timers, tasks and processes
    pub async fn dispose(&self) {
        info!("RtagsSession: disposing");
        self.file_changes.dispose();
        self.scheduler.dispose();
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.dispose();
        }
        self.daemon.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfigBuilder;
    use crate::diagnostics::testing::PipeLauncher;
    use crate::editor::testing::RecordingEditor;
    use crate::error::RcError;
    use crate::project::task::TaskState;
    use crate::rc::RcCommand;
    use crate::rc::testing::MockRcExecutor;
    use crate::test_utils::fixtures::TestFolder;
    use std::time::Duration;

    /// rdm answers probes and reports no known projects and no indexing
    fn responsive_rdm() -> MockRcExecutor {
        let executor = MockRcExecutor::new();
        executor.set_handler(|command| match command {
            RcCommand::ListProjects => Ok(String::new()),
            _ => Ok("0".to_string()),
        });
        executor
    }

    async fn start(
        config: SessionConfig,
        executor: &MockRcExecutor,
        folders: Vec<PathBuf>,
    ) -> (RtagsSession, Arc<RecordingEditor>, Arc<PipeLauncher>) {
        let editor = Arc::new(RecordingEditor::new());
        let (launcher, writers) = PipeLauncher::new(1);
        // Keep the producer alive for the whole test
        std::mem::forget(writers);
        let session = RtagsSession::start(
            config,
            Arc::new(executor.clone()),
            editor.clone(),
            launcher.clone(),
            folders,
        )
        .await;
        (session, editor, launcher)
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_start_loads_folders_and_starts_diagnostics() {
        let ws = TestFolder::new();
        let executor = responsive_rdm();
        let (session, editor, launcher) =
            start(SessionConfig::default(), &executor, vec![ws.path().to_path_buf()]).await;
        let mut events = session.scheduler().subscribe();

        assert!(session.registry().is_in_loading_project(&ws.path().join("a.cpp")));
        while events.recv().await.unwrap().state != TaskState::Succeeded {}

        assert!(session.registry().is_in_project(&ws.path().join("a.cpp"), None));
        assert_eq!(launcher.launches(), 1);
        assert!(session.diagnostics_active());
        assert_eq!(editor.context("rtags.multipleProjects"), Some(false));
        assert_eq!(executor.calls()[0].args(), vec!["--current-project"]);

        session.dispose().await;
        assert!(session.scheduler().running_task().is_none());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_unreachable_daemon_disables_diagnostics() {
        let executor = MockRcExecutor::new();
        executor.set_handler(|command| {
            Err(RcError::failed(&command.args(), Some(1), "Can't seem to connect to server"))
        });
        let config = SessionConfigBuilder::new()
            .auto_launch_rdm(false)
            .build()
            .unwrap();

        let (session, editor, launcher) = start(config, &executor, Vec::new()).await;

        assert_eq!(editor.errors().len(), 1);
        assert!(editor.errors()[0].contains("autoLaunchRdm"));
        assert_eq!(launcher.launches(), 0);
        assert!(!session.diagnostics_active());
        session.dispose().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_reindex_commands() {
        let executor = responsive_rdm();
        let config = SessionConfigBuilder::new()
            .diagnostics_enabled(false)
            .build()
            .unwrap();
        let (session, editor, _) = start(config, &executor, Vec::new()).await;

        assert!(session.reindex_active_project(None).is_none());
        assert!(session.reindex_active_project(Some(Path::new("/ws/a.cpp"))).is_none());
        assert!(session.reindex_all_projects().is_empty());
        assert_eq!(editor.infos().len(), 3);

        session.registry().add_root(PathBuf::from("/ws"));
        session.registry().add_root(PathBuf::from("/lib"));
        assert!(session.reindex_active_project(Some(Path::new("/ws/a.cpp"))).is_some());
        let running = session.scheduler().running_task().unwrap();
        assert_eq!(running.root, PathBuf::from("/ws"));
        assert_eq!(running.kind, TaskKind::Reindex);

        assert_eq!(session.reindex_all_projects().len(), 2);
        assert_eq!(session.scheduler().queued_tasks().len(), 2);
        session.dispose().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_configuration_changes() {
        let ws = TestFolder::new();
        let build = ws.database_dir("build");

        let executor = responsive_rdm();
        let (session, editor, _) =
            start(SessionConfig::default(), &executor, vec![ws.path().to_path_buf()]).await;

        let renamed = SessionConfigBuilder::new()
            .rdm_executable("/opt/rtags/bin/rdm")
            .build()
            .unwrap();
        session.configuration_changed(renamed).await;
        assert_eq!(editor.reload_prompts().len(), 1);
        assert!(editor.reload_prompts()[0].contains("rdmExecutable"));

        let overridden = SessionConfigBuilder::new()
            .rdm_executable("/opt/rtags/bin/rdm")
            .compilation_database_override(ws.path(), &build)
            .build()
            .unwrap();
        session.configuration_changed(overridden).await;
        assert_eq!(editor.reload_prompts().len(), 1);

        let loads: Vec<PathBuf> = session
            .scheduler()
            .queued_tasks()
            .into_iter()
            .chain(session.scheduler().running_task())
            .filter_map(|task| match task.kind {
                TaskKind::Load {
                    compilation_database_dir,
                } => Some(compilation_database_dir),
                TaskKind::Reindex => None,
            })
            .collect();
        assert_eq!(loads, vec![build]);
        session.dispose().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_removed_folder_is_unreachable() {
        let ws = TestFolder::new();
        let executor = responsive_rdm();
        let (session, _, _) =
            start(SessionConfig::default(), &executor, vec![ws.path().to_path_buf()]).await;
        let mut events = session.scheduler().subscribe();
        while events.recv().await.unwrap().state != TaskState::Succeeded {}
        let file = ws.path().join("src/main.cpp");
        assert_eq!(
            session.registry().get_project_root(&file),
            Some(ws.path().to_path_buf())
        );

        session
            .workspace_folders_changed(Vec::new(), vec![ws.path().to_path_buf()])
            .await;
        assert_eq!(session.registry().get_project_root(&file), None);
        session.dispose().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_dispose_stops_pending_reindex() {
        let executor = responsive_rdm();
        let config = SessionConfigBuilder::new()
            .diagnostics_enabled(false)
            .build()
            .unwrap();
        let (session, editor, _) = start(config, &executor, Vec::new()).await;
        session.registry().add_root(PathBuf::from("/ws"));
        editor.edit("/ws/a.cpp", "int a;");
        session.did_change(Path::new("/ws/a.cpp"));
        executor.clear();

        session.dispose().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(executor.calls().is_empty());
    }
}
