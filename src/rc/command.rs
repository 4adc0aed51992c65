//! Typed `rc` command lines
//!
//! Every backend call the engine makes is one of these variants; the argument
//! rendering lives here so the rest of the crate never builds flag strings.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// An open document with modifications not yet written to disk
///
/// Recomputed from editor state for every call; rc reads `content.len()` bytes
/// from stdin for each `--unsaved-file` argument, in argument order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsavedFile {
    pub path: PathBuf,
    pub content: Vec<u8>,
}

impl UnsavedFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// `--unsaved-file=<path>:<byteLength>`
    pub fn argument(&self) -> String {
        format!(
            "--unsaved-file={}:{}",
            self.path.display(),
            self.content.len()
        )
    }
}

/// One `rc` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RcCommand {
    /// Ask rdm to load a compilation database directory
    LoadCompileCommands { dir: PathBuf },
    /// Reindex a whole project
    ReindexProject { root: PathBuf },
    /// Unconditionally reindex one file
    ReindexFile { path: PathBuf },
    /// Reindex one file only if rdm thinks it is stale
    CheckReindex { path: PathBuf },
    /// Global indexing status, prints `1` while indexing
    IsIndexing { timeout: Duration },
    /// Suspend (`on`) or resume (`off`) rdm's file watch for a path
    Suspend {
        path: PathBuf,
        on: bool,
        timeout: Option<Duration>,
    },
    /// Request a fresh diagnostics batch for a file
    Diagnose { path: PathBuf },
    /// Long-lived diagnostics stream
    DiagnosticsStream,
    /// List the projects rdm knows about
    ListProjects,
    /// Forget a project
    DeleteProject { root: PathBuf },
    /// Connection probe
    CurrentProject,
}

impl RcCommand {
    /// Render the command-line arguments, without unsaved-file arguments
    pub fn args(&self) -> Vec<String> {
        match self {
            RcCommand::LoadCompileCommands { dir } => {
                vec!["--load-compile-commands".to_string(), path_arg(dir)]
            }
            RcCommand::ReindexProject { root } => vec![
                "--project".to_string(),
                path_arg(root),
                "--reindex".to_string(),
            ],
            RcCommand::ReindexFile { path } => vec!["--reindex".to_string(), path_arg(path)],
            RcCommand::CheckReindex { path } => {
                vec!["--check-reindex".to_string(), path_arg(path)]
            }
            RcCommand::IsIndexing { timeout } => vec![
                "--is-indexing".to_string(),
                "--timeout".to_string(),
                timeout.as_millis().to_string(),
            ],
            RcCommand::Suspend { path, on, timeout } => {
                let mut args = vec![
                    "--suspend".to_string(),
                    path_arg(path),
                    if *on { "on" } else { "off" }.to_string(),
                ];
                if let Some(timeout) = timeout {
                    args.push("--timeout".to_string());
                    args.push(timeout.as_millis().to_string());
                }
                args
            }
            RcCommand::Diagnose { path } => vec!["--diagnose".to_string(), path_arg(path)],
            RcCommand::DiagnosticsStream => {
                vec!["--diagnostics".to_string(), "--json".to_string()]
            }
            RcCommand::ListProjects => vec!["--project".to_string()],
            RcCommand::DeleteProject { root } => {
                vec!["--delete-project".to_string(), path_arg(root)]
            }
            RcCommand::CurrentProject => vec!["--current-project".to_string()],
        }
    }

    /// Render the arguments including one `--unsaved-file` per buffer
    pub fn args_with_unsaved(&self, unsaved: &[UnsavedFile]) -> Vec<String> {
        let mut args = self.args();
        args.extend(unsaved.iter().map(UnsavedFile::argument));
        args
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Parse `rc --project` output into project roots
///
/// One root per line; the current project carries a trailing ` <=` marker and
/// rdm prints roots with a trailing separator.
pub fn parse_project_list(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .map(|line| line.trim().trim_end_matches("<=").trim())
        .filter(|line| !line.is_empty())
        .map(|line| {
            let trimmed = line.trim_end_matches('/');
            if trimmed.is_empty() {
                PathBuf::from("/")
            } else {
                PathBuf::from(trimmed)
            }
        })
        .collect()
}

/// Interpret `rc --is-indexing` output
pub fn parse_is_indexing(output: &str) -> bool {
    output.trim() == "1"
}
