//! Project task model
//!
//! Load and Reindex are variants of one enum rather than a type hierarchy, so
//! the scheduler can match on them exhaustively.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::rc::RcCommand;

/// What a task asks rdm to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TaskKind {
    /// Load compile_commands.json from a directory; registers the root when done
    Load { compilation_database_dir: PathBuf },
    /// Reindex an already registered project
    Reindex,
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Load { .. } => "load",
            TaskKind::Reindex => "reindex",
        }
    }
}

/// Task lifecycle: `Queued -> Running -> Succeeded | Failed`, or `Cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// One Load or Reindex operation against one root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectTask {
    pub id: Uuid,
    pub root: PathBuf,
    pub kind: TaskKind,
    pub enqueued_at: DateTime<Utc>,
}

impl ProjectTask {
    pub fn new(root: PathBuf, kind: TaskKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            root,
            kind,
            enqueued_at: Utc::now(),
        }
    }

    /// The rc call that starts this task
    pub fn start_command(&self) -> RcCommand {
        match &self.kind {
            TaskKind::Load {
                compilation_database_dir,
            } => RcCommand::LoadCompileCommands {
                dir: compilation_database_dir.clone(),
            },
            TaskKind::Reindex => RcCommand::ReindexProject {
                root: self.root.clone(),
            },
        }
    }

    pub fn is_load(&self) -> bool {
        matches!(self.kind, TaskKind::Load { .. })
    }
}

/// Broadcast on every task state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub id: Uuid,
    pub root: PathBuf,
    pub kind: TaskKind,
    pub state: TaskState,
}

impl TaskEvent {
    pub fn new(task: &ProjectTask, state: TaskState) -> Self {
        Self {
            id: task.id,
            root: task.root.clone(),
            kind: task.kind.clone(),
            state,
        }
    }
}
