//! Project Task Scheduler
//!
//! rdm answers `--is-indexing` for the daemon as a whole, so it cannot tell us
//! when project A is done while project B is also indexing. The scheduler
//! therefore runs at most one Load/Reindex task at a time and keeps the rest in
//! a FIFO queue. This is a constraint of the backend interface, not a tuning
//! choice.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::editor::Editor;
use crate::project::registry::ProjectRegistry;
use crate::project::task::{ProjectTask, TaskEvent, TaskKind, TaskState};
use crate::project::{publish_project_count, unsaved_files_in_project};
use crate::rc::{RcCommand, RcExecutor, parse_is_indexing, query, try_query};

/// Capacity of the task event channel
const TASK_EVENT_CHANNEL_CAPACITY: usize = 64;

struct ActiveTask {
    task: ProjectTask,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<ProjectTask>,
    active: Option<ActiveTask>,
}

struct SchedulerInner {
    executor: Arc<dyn RcExecutor>,
    editor: Arc<dyn Editor>,
    registry: Arc<ProjectRegistry>,
    poll_interval: Duration,
    state: Mutex<SchedulerState>,
    events: broadcast::Sender<TaskEvent>,
}

/// Serialized queue of Load and Reindex tasks
#[derive(Clone)]
pub struct ProjectTaskScheduler {
    inner: Arc<SchedulerInner>,
}

impl ProjectTaskScheduler {
    pub fn new(
        executor: Arc<dyn RcExecutor>,
        editor: Arc<dyn Editor>,
        registry: Arc<ProjectRegistry>,
        poll_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(TASK_EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(SchedulerInner {
                executor,
                editor,
                registry,
                poll_interval,
                state: Mutex::new(SchedulerState::default()),
                events,
            }),
        }
    }

    /// Task state changes, for status reporting and tests
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Queue a task for `root`, starting it right away if nothing is running
    ///
    /// A request identical to one already waiting in the queue is folded into
    /// it and returns the queued task's id.
    pub fn schedule_task(&self, root: PathBuf, kind: TaskKind) -> Uuid {
        let task = ProjectTask::new(root, kind);
        {
            // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
            let mut state = self.inner.state.lock().unwrap();
            if let Some(existing) = state
                .queue
                .iter()
                .find(|queued| queued.root == task.root && queued.kind == task.kind)
            {
                debug!(
                    "ProjectTaskScheduler: {} for {} already queued",
                    task.kind.label(),
                    task.root.display()
                );
                return existing.id;
            }
            if task.is_load() {
                self.inner.registry.begin_loading(task.root.clone());
            }
            info!(
                "ProjectTaskScheduler: queued {} for {} ({})",
                task.kind.label(),
                task.root.display(),
                task.id
            );
            state.queue.push_back(task.clone());
        }
        self.emit(&task, TaskState::Queued);
        self.start_next();
        task.id
    }

    /// Drop queued tasks for `root` and stop its running task, if any
    ///
    /// Returns the number of tasks cancelled.
    pub fn cancel_root(&self, root: &Path) -> usize {
        let mut cancelled = Vec::new();
        {
            let mut state = self.inner.state.lock().unwrap();
            let (dropped, kept): (VecDeque<ProjectTask>, VecDeque<ProjectTask>) = state
                .queue
                .drain(..)
                .partition(|task| task.root == root);
            state.queue = kept;
            cancelled.extend(dropped);

            if state
                .active
                .as_ref()
                .is_some_and(|active| active.task.root == root)
                && let Some(active) = state.active.take()
            {
                active.cancel.cancel();
                cancelled.push(active.task);
            }
        }

        if cancelled.is_empty() {
            return 0;
        }

        self.inner.registry.finish_loading(root);
        for task in &cancelled {
            info!(
                "ProjectTaskScheduler: cancelled {} for {} ({})",
                task.kind.label(),
                task.root.display(),
                task.id
            );
            self.emit(task, TaskState::Cancelled);
        }
        self.start_next();
        cancelled.len()
    }

    /// The task occupying the single active slot
    pub fn running_task(&self) -> Option<ProjectTask> {
        self.inner
            .state
            .lock()
            .unwrap()
            .active
            .as_ref()
            .map(|active| active.task.clone())
    }

    /// Tasks waiting behind the active one, in order
    pub fn queued_tasks(&self) -> Vec<ProjectTask> {
        self.inner
            .state
            .lock()
            .unwrap()
            .queue
            .iter()
            .cloned()
            .collect()
    }

    /// Cancel everything without starting anything new
    pub fn dispose(&self) {
        let mut state = self.inner.state.lock().unwrap();
        for task in state.queue.drain(..) {
            self.inner.registry.finish_loading(&task.root);
        }
        if let Some(active) = state.active.take() {
            active.cancel.cancel();
            self.inner.registry.finish_loading(&active.task.root);
        }
    }

    fn emit(&self, task: &ProjectTask, state: TaskState) {
        // No subscribers is fine
        let _ = self.inner.events.send(TaskEvent::new(task, state));
    }

    fn start_next(&self) {
        let (task, cancel) = {
            let mut state = self.inner.state.lock().unwrap();
            if state.active.is_some() {
                return;
            }
            let Some(task) = state.queue.pop_front() else {
                return;
            };
            let cancel = CancellationToken::new();
            state.active = Some(ActiveTask {
                task: task.clone(),
                cancel: cancel.clone(),
            });
            (task, cancel)
        };

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_task(task, cancel).await;
        });
    }

    #[instrument(name = "project_task", skip_all, fields(id = %task.id, root = %task.root.display(), kind = task.kind.label()))]
    async fn run_task(&self, task: ProjectTask, cancel: CancellationToken) {
        let inner = &self.inner;
        let unsaved = match task.kind {
            TaskKind::Reindex => {
                unsaved_files_in_project(inner.editor.as_ref(), &inner.registry, &task.root)
            }
            TaskKind::Load { .. } => Vec::new(),
        };

        let started = tokio::select! {
            _ = cancel.cancelled() => return,
            output = query(
                inner.executor.as_ref(),
                inner.editor.as_ref(),
                task.start_command(),
                &unsaved,
            ) => output,
        };

        if started.is_none() {
            warn!("ProjectTaskScheduler: start command failed");
            self.finish(&task, TaskState::Failed);
            return;
        }

        info!("ProjectTaskScheduler: task running");
        self.emit(&task, TaskState::Running);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(inner.poll_interval) => {}
            }

            let status = tokio::select! {
                _ = cancel.cancelled() => return,
                output = try_query(
                    inner.executor.as_ref(),
                    RcCommand::IsIndexing { timeout: inner.poll_interval },
                    &[],
                ) => output,
            };

            match status {
                Some(output) if parse_is_indexing(&output) => {
                    debug!("ProjectTaskScheduler: still indexing");
                }
                _ => break,
            }
        }

        self.finish(&task, TaskState::Succeeded);
    }

    fn finish(&self, task: &ProjectTask, outcome: TaskState) {
        {
            let mut state = self.inner.state.lock().unwrap();
            match &state.active {
                Some(active) if active.task.id == task.id => state.active = None,
                // Cancelled while we were awaiting; cancel_root already cleaned up
                _ => return,
            }
        }

        let inner = &self.inner;
        if task.is_load() {
            inner.registry.finish_loading(&task.root);
        }

        if outcome == TaskState::Succeeded {
            if task.is_load() && inner.registry.add_root(task.root.clone()) {
                publish_project_count(inner.editor.as_ref(), &inner.registry);
            }
            let elapsed = chrono::Utc::now() - task.enqueued_at;
            info!(
                "ProjectTaskScheduler: {} of {} finished after {}s",
                task.kind.label(),
                task.root.display(),
                elapsed.num_seconds()
            );
            inner.editor.show_info(&format!(
                "RTags: finished indexing project {}",
                task.root.display()
            ));
        }

        self.emit(task, outcome);
        self.start_next();
    }
}
