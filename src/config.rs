//! Configuration for RTags bridge sessions
//!
//! Settings arrive from the editor host as camelCase JSON ([`Settings`]) and are
//! turned into a validated [`SessionConfig`] through [`SessionConfigBuilder`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default debounce delay between the last edit and the reindex request
pub const DEFAULT_REINDEX_DELAY_MS: u64 = 1000;

/// Upper bound on how long a save waits for rdm to suspend the file watch
pub const DEFAULT_SUSPEND_TIMEOUT_MS: u64 = 1000;

/// Delay before resuming a file watch after a save that changed nothing
pub const DEFAULT_RESUME_FALLBACK_DELAY_MS: u64 = 1000;

/// Interval between `--is-indexing` polls while a project task runs
pub const DEFAULT_INDEXING_POLL_INTERVAL_SECS: u64 = 5;

/// Delay before respawning a diagnostics process that died
pub const DEFAULT_DIAGNOSTICS_RESTART_BACKOFF_SECS: u64 = 5;

/// Hard limit for a single `rc` invocation
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// How long to wait for an auto-launched rdm to answer
pub const DEFAULT_DAEMON_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Name of the compilation database file rdm loads
pub const COMPILATION_DATABASE_FILE: &str = "compile_commands.json";

// ============================================================================
// Editor settings (wire form)
// ============================================================================

/// Diagnostics toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticsSettings {
    pub enabled: bool,
    pub open_files_only: bool,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            open_files_only: false,
        }
    }
}

/// Per-workspace-folder settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderSettings {
    /// Directory holding compile_commands.json, if not the folder itself
    pub compilation_database_directory: Option<PathBuf>,
}

/// Settings as sent by the editor host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub rc_executable: Option<String>,
    pub rdm_executable: Option<String>,
    pub auto_launch_rdm: bool,
    pub rdm_arguments: Vec<String>,
    pub diagnostics: DiagnosticsSettings,
    pub reindex_delay_ms: Option<u64>,
    /// Keyed by workspace folder path
    pub folders: BTreeMap<PathBuf, FolderSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rc_executable: None,
            rdm_executable: None,
            auto_launch_rdm: true,
            rdm_arguments: Vec::new(),
            diagnostics: DiagnosticsSettings::default(),
            reindex_delay_ms: None,
            folders: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ============================================================================
// Core Configuration Types
// ============================================================================

/// Timing knobs for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    pub reindex_delay: Duration,
    pub suspend_timeout: Duration,
    pub resume_fallback_delay: Duration,
    pub indexing_poll_interval: Duration,
    pub diagnostics_restart_backoff: Duration,
    pub query_timeout: Duration,
    pub daemon_startup_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reindex_delay: Duration::from_millis(DEFAULT_REINDEX_DELAY_MS),
            suspend_timeout: Duration::from_millis(DEFAULT_SUSPEND_TIMEOUT_MS),
            resume_fallback_delay: Duration::from_millis(DEFAULT_RESUME_FALLBACK_DELAY_MS),
            indexing_poll_interval: Duration::from_secs(DEFAULT_INDEXING_POLL_INTERVAL_SECS),
            diagnostics_restart_backoff: Duration::from_secs(
                DEFAULT_DIAGNOSTICS_RESTART_BACKOFF_SECS,
            ),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            daemon_startup_timeout: Duration::from_secs(DEFAULT_DAEMON_STARTUP_TIMEOUT_SECS),
        }
    }
}

/// Complete, validated session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub rc_executable: String,
    pub rdm_executable: String,
    pub auto_launch_rdm: bool,
    pub rdm_arguments: Vec<String>,
    pub diagnostics_enabled: bool,
    pub diagnostics_open_files_only: bool,
    pub timings: Timings,
    /// Per-folder compilation database overrides, validated lazily per folder
    pub compilation_database_overrides: BTreeMap<PathBuf, PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rc_executable: "rc".to_string(),
            rdm_executable: "rdm".to_string(),
            auto_launch_rdm: true,
            rdm_arguments: Vec::new(),
            diagnostics_enabled: true,
            diagnostics_open_files_only: false,
            timings: Timings::default(),
            compilation_database_overrides: BTreeMap::new(),
        }
    }
}

impl SessionConfig {
    /// Directory rdm should load compile_commands.json from for `folder`
    ///
    /// Fails for relative overrides; the caller reports it for that folder only.
    pub fn compilation_database_dir(&self, folder: &Path) -> Result<PathBuf, ConfigError> {
        match self.compilation_database_overrides.get(folder) {
            Some(dir) if !dir.is_absolute() => Err(ConfigError::relative_path(
                "compilationDatabaseDirectory",
                dir.clone(),
            )),
            Some(dir) => Ok(dir.clone()),
            None => Ok(folder.to_path_buf()),
        }
    }

    /// Settings whose change only takes effect after the editor reloads
    pub fn reload_required(&self, other: &SessionConfig) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.rc_executable != other.rc_executable {
            changed.push("rcExecutable");
        }
        if self.rdm_executable != other.rdm_executable {
            changed.push("rdmExecutable");
        }
        if self.auto_launch_rdm != other.auto_launch_rdm {
            changed.push("autoLaunchRdm");
        }
        if self.rdm_arguments != other.rdm_arguments {
            changed.push("rdmArguments");
        }
        if self.diagnostics_enabled != other.diagnostics_enabled {
            changed.push("diagnostics.enabled");
        }
        if self.diagnostics_open_files_only != other.diagnostics_open_files_only {
            changed.push("diagnostics.openFilesOnly");
        }
        changed
    }

    /// Folders whose compilation database override differs between `self` and `other`
    pub fn changed_overrides(&self, other: &SessionConfig) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = self
            .compilation_database_overrides
            .keys()
            .chain(other.compilation_database_overrides.keys())
            .filter(|folder| {
                self.compilation_database_overrides.get(*folder)
                    != other.compilation_database_overrides.get(*folder)
            })
            .cloned()
            .collect();
        folders.sort();
        folders.dedup();
        folders
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for SessionConfig with validation and defaults
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    rc_executable: Option<String>,
    rdm_executable: Option<String>,
    auto_launch_rdm: Option<bool>,
    rdm_arguments: Vec<String>,
    diagnostics_enabled: Option<bool>,
    diagnostics_open_files_only: Option<bool>,
    timings: Timings,
    compilation_database_overrides: BTreeMap<PathBuf, PathBuf>,
}

impl SessionConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the builder from editor settings
    pub fn from_settings(settings: &Settings) -> Self {
        let mut builder = Self::new()
            .auto_launch_rdm(settings.auto_launch_rdm)
            .rdm_arguments(settings.rdm_arguments.iter().cloned())
            .diagnostics_enabled(settings.diagnostics.enabled)
            .diagnostics_open_files_only(settings.diagnostics.open_files_only);

        if let Some(rc) = &settings.rc_executable {
            builder = builder.rc_executable(rc.clone());
        }
        if let Some(rdm) = &settings.rdm_executable {
            builder = builder.rdm_executable(rdm.clone());
        }
        if let Some(delay) = settings.reindex_delay_ms {
            builder = builder.reindex_delay(Duration::from_millis(delay));
        }
        for (folder, folder_settings) in &settings.folders {
            if let Some(dir) = &folder_settings.compilation_database_directory {
                builder = builder.compilation_database_override(folder.clone(), dir.clone());
            }
        }
        builder
    }

    pub fn rc_executable(mut self, path: impl Into<String>) -> Self {
        self.rc_executable = Some(path.into());
        self
    }

    pub fn rdm_executable(mut self, path: impl Into<String>) -> Self {
        self.rdm_executable = Some(path.into());
        self
    }

    pub fn auto_launch_rdm(mut self, enabled: bool) -> Self {
        self.auto_launch_rdm = Some(enabled);
        self
    }

    pub fn rdm_arguments(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.rdm_arguments = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn diagnostics_enabled(mut self, enabled: bool) -> Self {
        self.diagnostics_enabled = Some(enabled);
        self
    }

    pub fn diagnostics_open_files_only(mut self, enabled: bool) -> Self {
        self.diagnostics_open_files_only = Some(enabled);
        self
    }

    pub fn reindex_delay(mut self, delay: Duration) -> Self {
        self.timings.reindex_delay = delay;
        self
    }

    pub fn suspend_timeout(mut self, timeout: Duration) -> Self {
        self.timings.suspend_timeout = timeout;
        self
    }

    pub fn resume_fallback_delay(mut self, delay: Duration) -> Self {
        self.timings.resume_fallback_delay = delay;
        self
    }

    pub fn indexing_poll_interval(mut self, interval: Duration) -> Self {
        self.timings.indexing_poll_interval = interval;
        self
    }

    pub fn diagnostics_restart_backoff(mut self, backoff: Duration) -> Self {
        self.timings.diagnostics_restart_backoff = backoff;
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.timings.query_timeout = timeout;
        self
    }

    /// Use `dir` instead of `folder` as the compilation database location
    pub fn compilation_database_override(
        mut self,
        folder: impl Into<PathBuf>,
        dir: impl Into<PathBuf>,
    ) -> Self {
        self.compilation_database_overrides
            .insert(folder.into(), dir.into());
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        let defaults = SessionConfig::default();
        let rc_executable = self.rc_executable.unwrap_or(defaults.rc_executable);
        let rdm_executable = self.rdm_executable.unwrap_or(defaults.rdm_executable);

        if rc_executable.trim().is_empty() {
            return Err(ConfigError::invalid_value("rcExecutable", "must not be empty"));
        }
        if rdm_executable.trim().is_empty() {
            return Err(ConfigError::invalid_value("rdmExecutable", "must not be empty"));
        }
        Self::validate_timings(&self.timings)?;

        Ok(SessionConfig {
            rc_executable,
            rdm_executable,
            auto_launch_rdm: self.auto_launch_rdm.unwrap_or(defaults.auto_launch_rdm),
            rdm_arguments: self.rdm_arguments,
            diagnostics_enabled: self
                .diagnostics_enabled
                .unwrap_or(defaults.diagnostics_enabled),
            diagnostics_open_files_only: self
                .diagnostics_open_files_only
                .unwrap_or(defaults.diagnostics_open_files_only),
            timings: self.timings,
            compilation_database_overrides: self.compilation_database_overrides,
        })
    }

    fn validate_timings(timings: &Timings) -> Result<(), ConfigError> {
        let checks = [
            ("reindexDelay", timings.reindex_delay),
            ("suspendTimeout", timings.suspend_timeout),
            ("indexingPollInterval", timings.indexing_poll_interval),
            ("queryTimeout", timings.query_timeout),
        ];
        for (setting, value) in checks {
            if value.is_zero() {
                return Err(ConfigError::invalid_value(setting, "must be greater than zero"));
            }
        }
        Ok(())
    }
}
