//! SubprocessAction - run a job as a child process.
//!
//! The coordinator dispatches jobs this way so it never executes job
//! bodies itself; a crash inside the job takes down only the child.

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::JobError;
use crate::ports::JobAction;

#[derive(Debug, Clone)]
pub struct SubprocessAction {
    program: PathBuf,
    args: Vec<OsString>,
}

impl SubprocessAction {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl JobAction for SubprocessAction {
    async fn run(&self) -> Result<(), JobError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .await
            .map_err(JobError::Spawn)?;
        if status.success() {
            Ok(())
        } else {
            Err(JobError::Exit {
                code: status.code(),
            })
        }
    }
}
