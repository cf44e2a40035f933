//! WorkerLauncher port - how the supervisor gets a worker process.
//!
//! The supervisor only sees these traits, so crash handling is tested
//! against scripted fakes while production re-executes the binary
//! (`impls::ProcessLauncher`).

use async_trait::async_trait;

use crate::error::SupervisorError;

#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Start one worker for the given logical slot.
    async fn launch(&self, index: usize) -> Result<Box<dyn WorkerProcess>, SupervisorError>;
}

/// A running worker.
#[async_trait]
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Resolve once the process has exited. Returns its exit code, `None`
    /// when it died from a signal.
    async fn wait(&mut self) -> std::io::Result<Option<i32>>;

    /// Ask the process to stop. `wait` still has to be awaited afterwards.
    async fn terminate(&mut self) -> std::io::Result<()>;
}
