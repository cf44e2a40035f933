//! ProcessLauncher - workers as child processes of the coordinator.
//!
//! Each worker is the same executable started with a worker subcommand
//! and `--index <n>`. The child's stdin is a pipe held by the coordinator:
//! closing it is the graceful-stop signal, and a coordinator that dies
//! closes it too, so workers never outlive their supervisor.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, ChildStdin, Command};

use crate::error::SupervisorError;
use crate::ports::{WorkerLauncher, WorkerProcess};

#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessLauncher {
    /// `args` come before the appended `--index <n>`.
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-execute the running binary.
    pub fn current_exe(
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, args))
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, index: usize) -> Result<Box<dyn WorkerProcess>, SupervisorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--index")
            .arg(index.to_string())
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| SupervisorError::Launch { index, source })?;
        let stdin = child.stdin.take();
        Ok(Box::new(ChildWorker { child, stdin }))
    }
}

struct ChildWorker {
    child: Child,
    stdin: Option<ChildStdin>,
}

#[async_trait]
impl WorkerProcess for ChildWorker {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        // EOF on the worker's stdin
        self.stdin.take();
        Ok(())
    }
}
