//! Process management layer
//!
//! Handles external process lifecycle and stderr monitoring for the long-lived
//! RTags children. Stdout is handed to the caller untouched.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

// ============================================================================
// Process State Management
// ============================================================================

/// How to stop a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Try graceful shutdown first (SIGTERM)
    Graceful,
    /// Force kill immediately (SIGKILL)
    Force,
}

/// Process lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Process has not been started yet
    NotStarted,
    /// Process is currently running
    Running { pid: u32 },
    /// Process has been stopped (either deliberately or by exiting on its own)
    Stopped,
}

impl ProcessState {
    /// Get the process ID if the process is running
    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Running { pid } => Some(*pid),
            _ => None,
        }
    }

    /// Check if the process is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }
}

// ============================================================================
// Process Exit Events
// ============================================================================

/// Event fired when a process exits without being asked to
#[derive(Debug, Clone)]
pub struct ProcessExitEvent {
    /// Program that exited
    pub command: String,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
}

/// Trait for handling process exit events
#[async_trait]
pub trait ProcessExitHandler: Send + Sync {
    /// Called when the process exits and no stop was requested
    async fn on_process_exit(&self, event: ProcessExitEvent);
}

// ============================================================================
// Stderr Monitoring Trait
// ============================================================================

/// Trait for monitoring stderr output from external processes
pub trait StderrMonitor: Send + Sync {
    /// Install a handler for stderr lines
    ///
    /// Only one handler can be active at a time. Monitoring starts when the
    /// process starts; without a handler, stderr is drained and traced.
    fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static;
}

// ============================================================================
// Process Management
// ============================================================================

/// Error types for process management
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Process not started")]
    NotStarted,

    #[error("Process already started")]
    AlreadyStarted,

    #[error("Stdout not available")]
    StdoutNotAvailable,

    #[error("Stderr not available")]
    StderrNotAvailable,
}

/// Trait for managing external process lifecycle
#[async_trait]
pub trait ProcessManager: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start the external process
    async fn start(&mut self) -> Result<(), Self::Error>;

    /// Stop the external process
    async fn stop(&mut self, mode: StopMode) -> Result<(), Self::Error>;

    /// Check if the process is currently running
    fn is_running(&self) -> bool;

    /// Take ownership of the child's stdout (only once per start)
    fn take_stdout(&mut self) -> Result<ChildStdout, Self::Error>;

    /// Synchronous force kill for Drop implementations
    fn kill_sync(&mut self);
}

/// Manages a child process spawned via Command
pub struct ChildProcessManager {
    /// Command to execute
    command: String,

    /// Command arguments
    args: Vec<String>,

    /// Working directory for the process (optional)
    working_directory: Option<PathBuf>,

    /// Thread-safe process state
    state: Arc<Mutex<ProcessState>>,

    /// Set before a deliberate stop so the wait task stays quiet
    stop_requested: Arc<Mutex<bool>>,

    /// Stdout pipe, until the caller takes it
    stdout: Option<ChildStdout>,

    /// Stderr handler
    stderr_handler: Option<Box<dyn Fn(String) + Send + Sync>>,

    /// Stderr monitoring task handle
    stderr_task: Option<JoinHandle<()>>,

    /// Process wait task handle (waits for child to exit)
    wait_task: Option<JoinHandle<()>>,

    /// Process exit event handler
    exit_handler: Option<Arc<dyn ProcessExitHandler>>,
}

impl ChildProcessManager {
    /// Create a new child process manager
    pub fn new(command: String, args: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            command,
            args,
            working_directory: working_dir,
            state: Arc::new(Mutex::new(ProcessState::NotStarted)),
            stop_requested: Arc::new(Mutex::new(false)),
            stdout: None,
            stderr_handler: None,
            stderr_task: None,
            wait_task: None,
            exit_handler: None,
        }
    }

    /// Install the handler fired on unexpected exit
    pub fn with_exit_handler(mut self, handler: Arc<dyn ProcessExitHandler>) -> Self {
        self.exit_handler = Some(handler);
        self
    }

    /// Get current process state (thread-safe)
    pub fn get_state(&self) -> ProcessState {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state.lock().unwrap().clone()
    }

    /// Command line, for logging
    pub fn command_line(&self) -> String {
        format!("{} {}", self.command, self.args.join(" "))
    }

    /// Spawn the stderr monitoring task
    ///
    /// Always drains stderr to prevent the child from blocking on a full pipe.
    fn spawn_stderr_monitor(&mut self, stderr: tokio::process::ChildStderr) {
        if self.stderr_task.is_some() {
            return;
        }

        let handler = self.stderr_handler.take();
        let command = self.command.clone();

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        trace!("ChildProcessManager: {} stderr EOF reached", command);
                        break;
                    }
                    Ok(_) => {
                        let line_content = line.trim().to_string();
                        if line_content.is_empty() {
                            continue;
                        }
                        match handler {
                            Some(ref handler) => handler(line_content),
                            None => trace!("ChildProcessManager: {} stderr: {}", command, line_content),
                        }
                    }
                    Err(e) => {
                        error!("Failed to read from {} stderr: {}", command, e);
                        break;
                    }
                }
            }
        });

        self.stderr_task = Some(task);
    }

    /// Spawn the wait task that monitors child process exit
    fn spawn_wait_task(&mut self, mut child: Child) {
        let current_pid = self.get_state().pid();
        let exit_handler = self.exit_handler.clone();
        let state = Arc::clone(&self.state);
        let stop_requested = Arc::clone(&self.stop_requested);
        let command = self.command.clone();

        let task = tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(exit_status) => {
                    info!(
                        "Process {} (PID {:?}) exited with status: {}",
                        command, current_pid, exit_status
                    );
                    exit_status.code()
                }
                Err(e) => {
                    error!("Error waiting for {}: {}", command, e);
                    None
                }
            };

            if let Ok(mut process_state) = state.lock() {
                *process_state = ProcessState::Stopped;
            }

            let deliberate = stop_requested.lock().map(|flag| *flag).unwrap_or(false);
            if deliberate {
                trace!("ChildProcessManager: {} stopped on request", command);
                return;
            }

            if let Some(handler) = &exit_handler {
                handler
                    .on_process_exit(ProcessExitEvent { command, code })
                    .await;
            }
        });

        self.wait_task = Some(task);
    }

    fn signal(&self, pid: u32, mode: StopMode) {
        #[cfg(unix)]
        {
            let signal = match mode {
                StopMode::Graceful => libc::SIGTERM,
                StopMode::Force => libc::SIGKILL,
            };
            // SAFETY: kill(2) with a pid we spawned and still track as running
            if unsafe { libc::kill(pid as libc::pid_t, signal) } == 0 {
                info!("Sent {:?} signal to process {}", mode, pid);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = (pid, mode);
            tracing::warn!("Process termination not implemented on this platform");
        }
    }
}

#[async_trait]
impl ProcessManager for ChildProcessManager {
    type Error = ProcessError;

    async fn start(&mut self) -> Result<(), Self::Error> {
        if self.is_running() {
            return Err(ProcessError::AlreadyStarted);
        }

        info!("Starting process: {} {:?}", self.command, self.args);

        let mut command_builder = Command::new(&self.command);
        command_builder
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(working_dir) = &self.working_directory {
            command_builder.current_dir(working_dir);
        }

        let mut child = command_builder.spawn().map_err(|source| ProcessError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let Some(pid) = child.id() else {
            return Err(ProcessError::Io(io::Error::other("Failed to get process ID")));
        };
        info!("Process {} started with PID: {}", self.command, pid);

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Running { pid };
        *self.stop_requested.lock().unwrap() = false;

        self.stdout = Some(
            child
                .stdout
                .take()
                .ok_or(ProcessError::StdoutNotAvailable)?,
        );
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::StderrNotAvailable)?;

        self.spawn_stderr_monitor(stderr);
        self.spawn_wait_task(child);

        Ok(())
    }

    async fn stop(&mut self, mode: StopMode) -> Result<(), Self::Error> {
        let pid = match self.get_state().pid() {
            Some(pid) => pid,
            None => return Err(ProcessError::NotStarted),
        };

        match mode {
            StopMode::Graceful => info!("Gracefully stopping process with PID: {}", pid),
            StopMode::Force => info!("Force killing process with PID: {}", pid),
        }

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.stop_requested.lock().unwrap() = true;
        self.stdout = None;
        self.signal(pid, mode);

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        *self.state.lock().unwrap() = ProcessState::Stopped;

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.get_state().is_running()
    }

    fn take_stdout(&mut self) -> Result<ChildStdout, Self::Error> {
        self.stdout.take().ok_or(ProcessError::NotStarted)
    }

    fn kill_sync(&mut self) {
        let pid = match self.get_state().pid() {
            Some(pid) => pid,
            None => return,
        };

        info!("Synchronously force killing process with PID: {}", pid);

        if let Ok(mut flag) = self.stop_requested.lock() {
            *flag = true;
        }
        self.signal(pid, StopMode::Force);

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        if let Ok(mut state) = self.state.lock() {
            *state = ProcessState::Stopped;
        }
    }
}

impl StderrMonitor for ChildProcessManager {
    fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stderr_handler = Some(Box::new(handler));
    }
}

impl Drop for ChildProcessManager {
    fn drop(&mut self) {
        self.kill_sync();
    }
}
