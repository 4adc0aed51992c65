//! rdm connection probing and auto-launch
//!
//! rc is useless without a running rdm. At session start the supervisor probes
//! the daemon with `rc --current-project`; when nothing answers and auto-launch
//! is enabled it spawns rdm and waits until the probe succeeds.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::io::{
    ChildProcessManager, ProcessExitEvent, ProcessExitHandler, ProcessManager, StderrMonitor,
    StopMode,
};
use crate::rc::command::RcCommand;
use crate::rc::executor::{RcExecutor, try_query};

/// Interval between connection probes while rdm starts up
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of [`DaemonSupervisor::ensure_running`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    /// Someone else's rdm answered the probe
    AlreadyRunning,
    /// We started rdm and it answered
    Launched,
}

struct ExitLogger;

#[async_trait]
impl ProcessExitHandler for ExitLogger {
    async fn on_process_exit(&self, event: ProcessExitEvent) {
        warn!(
            "rdm exited unexpectedly (exit code {:?}); rc calls will fail until it is restarted",
            event.code
        );
    }
}

/// Owns an auto-launched rdm, if any
pub struct DaemonSupervisor {
    rdm_executable: String,
    rdm_arguments: Vec<String>,
    auto_launch: bool,
    startup_timeout: Duration,
    process: Mutex<Option<ChildProcessManager>>,
}

impl DaemonSupervisor {
    pub fn new(
        rdm_executable: impl Into<String>,
        rdm_arguments: Vec<String>,
        auto_launch: bool,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            rdm_executable: rdm_executable.into(),
            rdm_arguments,
            auto_launch,
            startup_timeout,
            process: Mutex::new(None),
        }
    }

    /// Make sure rdm answers, launching it when allowed
    pub async fn ensure_running(
        &self,
        executor: &dyn RcExecutor,
    ) -> Result<DaemonStatus, SessionError> {
        if Self::probe(executor).await {
            info!("DaemonSupervisor: rdm is already running");
            return Ok(DaemonStatus::AlreadyRunning);
        }

        if !self.auto_launch {
            return Err(SessionError::daemon_unavailable(
                "rdm is not running and autoLaunchRdm is disabled",
            ));
        }

        let mut manager = ChildProcessManager::new(
            self.rdm_executable.clone(),
            self.rdm_arguments.clone(),
            None,
        )
        .with_exit_handler(Arc::new(ExitLogger));
        manager.on_stderr_line(|line| debug!(target: "rdm", "{}", line));
        manager.start().await?;
        info!("DaemonSupervisor: launched {}", manager.command_line());

        // rdm logs to stdout; keep draining it so it never blocks
        if let Ok(stdout) = manager.take_stdout() {
            tokio::spawn(async move {
                let mut stdout = stdout;
                let _ = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await;
            });
        }

        let deadline = tokio::time::Instant::now() + self.startup_timeout;
        loop {
            if Self::probe(executor).await {
                info!("DaemonSupervisor: rdm is answering");
                *self.process.lock().await = Some(manager);
                return Ok(DaemonStatus::Launched);
            }
            if !manager.is_running() || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }

        let _ = manager.stop(StopMode::Force).await;
        Err(SessionError::daemon_unavailable(format!(
            "{} did not answer within {:?}",
            self.rdm_executable, self.startup_timeout
        )))
    }

    /// Whether this supervisor started the running rdm
    pub async fn owns_daemon(&self) -> bool {
        self.process
            .lock()
            .await
            .as_ref()
            .is_some_and(|manager| manager.is_running())
    }

    /// Stop the rdm we launched, if any
    pub async fn shutdown(&self) {
        if let Some(mut manager) = self.process.lock().await.take()
            && manager.is_running()
        {
            info!("DaemonSupervisor: stopping auto-launched rdm");
            let _ = manager.stop(StopMode::Graceful).await;
        }
    }

    async fn probe(executor: &dyn RcExecutor) -> bool {
        try_query(executor, RcCommand::CurrentProject, &[])
            .await
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RcError;
    use crate::rc::testing::MockRcExecutor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn refuse(args: &RcCommand) -> Result<String, RcError> {
        Err(RcError::failed(&args.args(), Some(1), "Can't seem to connect to server"))
    }

    #[tokio::test]
    async fn test_already_running() {
        let executor = MockRcExecutor::new();
        let supervisor = DaemonSupervisor::new("rdm", Vec::new(), true, Duration::from_secs(1));

        let status = supervisor.ensure_running(&executor).await.unwrap();
        assert_eq!(status, DaemonStatus::AlreadyRunning);
        assert!(!supervisor.owns_daemon().await);
        assert_eq!(executor.calls()[0].args(), vec!["--current-project"]);
    }

    #[tokio::test]
    async fn test_unreachable_without_auto_launch() {
        let executor = MockRcExecutor::new();
        executor.set_handler(refuse);
        let supervisor = DaemonSupervisor::new("rdm", Vec::new(), false, Duration::from_secs(1));

        let result = supervisor.ensure_running(&executor).await;
        assert!(matches!(result, Err(SessionError::DaemonUnavailable { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launches_and_waits_for_answer() {
        let executor = MockRcExecutor::new();
        let probes = Arc::new(AtomicUsize::new(0));
        let probes_clone = Arc::clone(&probes);
        executor.set_handler(move |command| {
            if probes_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                refuse(command)
            } else {
                Ok("/ws/\n".to_string())
            }
        });
        // `sleep` stands in for a long-running rdm
        let supervisor = DaemonSupervisor::new(
            "sleep",
            vec!["30".to_string()],
            true,
            Duration::from_secs(5),
        );

        let status = supervisor.ensure_running(&executor).await.unwrap();
        assert_eq!(status, DaemonStatus::Launched);
        assert!(supervisor.owns_daemon().await);

        supervisor.shutdown().await;
        assert!(!supervisor.owns_daemon().await);
    }

    #[tokio::test]
    async fn test_launch_failure_is_process_error() {
        let executor = MockRcExecutor::new();
        executor.set_handler(refuse);
        let supervisor = DaemonSupervisor::new(
            "/nonexistent/rtags-bridge-rdm",
            Vec::new(),
            true,
            Duration::from_secs(1),
        );

        let result = supervisor.ensure_running(&executor).await;
        assert!(matches!(result, Err(SessionError::Process(_))));
    }
}
