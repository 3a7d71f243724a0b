//! Worker construction, split out from the Orchestrator so tests can swap
//! in an in-memory worker without spawning a process (spec.md §8
//! "integration test... driving a fake LM Client and a fake Worker").

use std::sync::Arc;

use rlm_domain::config::InterpreterConfig;
use rlm_worker::{Worker, WorkerClient, WorkerError};

/// Builds one [`Worker`] per run. A trait rather than a bare constructor so
/// the Orchestrator never has to know whether it's talking to a real child
/// process or a test double.
pub trait WorkerFactory: Send + Sync {
    fn spawn(&self) -> Result<Arc<dyn Worker>, WorkerError>;
}

/// Spawns the configured interpreter command as a child process per run.
pub struct ProcessWorkerFactory {
    config: InterpreterConfig,
}

impl ProcessWorkerFactory {
    pub fn new(config: InterpreterConfig) -> Self {
        Self { config }
    }
}

impl WorkerFactory for ProcessWorkerFactory {
    fn spawn(&self) -> Result<Arc<dyn Worker>, WorkerError> {
        let client = WorkerClient::spawn(&self.config)?;
        Ok(Arc::new(client))
    }
}
