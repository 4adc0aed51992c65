//! Mock rc executor for unit tests
//!
//! Records every invocation and answers through a programmable handler.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::RcError;
use crate::rc::command::{RcCommand, UnsavedFile};
use crate::rc::executor::RcExecutor;

type Handler = Arc<dyn Fn(&RcCommand) -> Result<String, RcError> + Send + Sync>;

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub command: RcCommand,
    pub unsaved: Vec<PathBuf>,
}

impl RecordedCall {
    pub fn args(&self) -> Vec<String> {
        self.command.args()
    }
}

/// Executor double: records calls, answers `Ok("")` unless told otherwise
#[derive(Clone)]
pub struct MockRcExecutor {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    handler: Arc<Mutex<Option<Handler>>>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl MockRcExecutor {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            handler: Arc::new(Mutex::new(None)),
            latency: Arc::new(Mutex::new(None)),
        }
    }

    /// Answer every call through `handler`
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&RcCommand) -> Result<String, RcError> + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Delay every answer, simulating a slow rdm
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose command matches `predicate`
    pub fn calls_where<P>(&self, predicate: P) -> Vec<RecordedCall>
    where
        P: Fn(&RcCommand) -> bool,
    {
        self.calls()
            .into_iter()
            .filter(|call| predicate(&call.command))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Default for MockRcExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RcExecutor for MockRcExecutor {
    async fn execute(
        &self,
        command: &RcCommand,
        unsaved: &[UnsavedFile],
    ) -> Result<String, RcError> {
        self.calls.lock().unwrap().push(RecordedCall {
            command: command.clone(),
            unsaved: unsaved.iter().map(|file| file.path.clone()).collect(),
        });

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let handler = self.handler.lock().unwrap().clone();
        match handler {
            Some(handler) => handler(command),
            None => Ok(String::new()),
        }
    }
}
