//! Error types for the RTags bridge
//!
//! Each layer gets its own `thiserror` enum. Single-shot backend queries turn
//! these into `None` at the component boundary (see [`crate::rc::query`]), so
//! most of the engine only ever sees absence, never an error value.

use std::path::PathBuf;
use std::time::Duration;

use crate::io::ProcessError;

// ============================================================================
// rc invocation errors
// ============================================================================

/// Failure of a single `rc` invocation
#[derive(Debug, thiserror::Error)]
pub enum RcError {
    /// The client binary could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading output or writing unsaved buffers failed
    #[error("I/O error talking to rc: {0}")]
    Io(#[from] std::io::Error),

    /// rc exited with a non-zero status
    #[error("rc {args} failed (exit code {code:?}): {stderr}")]
    Failed {
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    /// rc did not finish in time
    #[error("rc {args} timed out after {timeout:?}")]
    Timeout { args: String, timeout: Duration },
}

impl RcError {
    pub fn failed(args: &[String], code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::Failed {
            args: args.join(" "),
            code,
            stderr: stderr.into(),
        }
    }

    pub fn timeout(args: &[String], timeout: Duration) -> Self {
        Self::Timeout {
            args: args.join(" "),
            timeout,
        }
    }
}

// ============================================================================
// Configuration errors
// ============================================================================

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A path setting must be absolute
    #[error("{setting} must be an absolute path, got: {path}")]
    RelativePath { setting: String, path: PathBuf },

    /// No compile_commands.json where one was expected
    #[error("No compile_commands.json found in {dir}")]
    MissingCompilationDatabase { dir: PathBuf },

    /// compile_commands.json exists but cannot be used
    #[error("Invalid compilation database {path}: {reason}")]
    InvalidCompilationDatabase { path: PathBuf, reason: String },

    /// A setting has an unusable value
    #[error("Invalid value for {setting}: {reason}")]
    InvalidValue { setting: String, reason: String },

    /// Settings file could not be read
    #[error("Failed to read settings file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid JSON for the settings schema
    #[error("Failed to parse settings file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn relative_path(setting: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::RelativePath {
            setting: setting.into(),
            path: path.into(),
        }
    }

    pub fn invalid_value(setting: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            setting: setting.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Session errors
// ============================================================================

/// Errors that stop a session from starting
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("rc error: {0}")]
    Rc(#[from] RcError),

    /// rdm is not reachable and could not be launched
    #[error("rdm daemon unavailable: {reason}")]
    DaemonUnavailable { reason: String },
}

impl SessionError {
    pub fn daemon_unavailable(reason: impl Into<String>) -> Self {
        Self::DaemonUnavailable {
            reason: reason.into(),
        }
    }
}
