//! In-memory diagnostics launcher for unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::DuplexStream;

use crate::diagnostics::stream::{DiagnosticsLauncher, DiagnosticsProcess};
use crate::io::ProcessError;

/// Hands out queued in-memory pipes; fails once the queue is empty
pub struct PipeLauncher {
    pipes: Mutex<VecDeque<DuplexStream>>,
    launches: AtomicUsize,
}

impl PipeLauncher {
    /// Returns the launcher and the writing ends, one per launch
    pub fn new(count: usize) -> (Arc<Self>, Vec<DuplexStream>) {
        let mut readers = VecDeque::new();
        let mut writers = Vec::new();
        for _ in 0..count {
            let (writer, reader) = tokio::io::duplex(1024);
            readers.push_back(reader);
            writers.push(writer);
        }
        let launcher = Arc::new(Self {
            pipes: Mutex::new(readers),
            launches: AtomicUsize::new(0),
        });
        (launcher, writers)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiagnosticsLauncher for PipeLauncher {
    async fn launch(&self) -> Result<DiagnosticsProcess, ProcessError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let pipe = self
            .pipes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProcessError::Spawn {
                command: "rc".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            })?;
        Ok(DiagnosticsProcess {
            stdout: Box::new(pipe),
            process: None,
        })
    }
}
