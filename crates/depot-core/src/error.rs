//! Error types, one enum per concern.
//!
//! Startup-time kinds (config, schedule, store) are fatal and roll up into
//! [`StartupError`]. Runtime kinds (cleanup, job, worker crash) are logged
//! where they happen and never end the process.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::ThingId;

/// Missing or invalid required setting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker count must be at least 1 (got {0})")]
    InvalidWorkerCount(usize),

    #[error("failed to read schedule file {path}: {source}")]
    ScheduleRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed schedule file {path}: {source}")]
    ScheduleParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("schedule names job '{0}' but no such job exists")]
    UnknownJob(String),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Document store unreachable or an operation on it failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("record {0} not found")]
    NotFound(ThingId),

    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("document store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Filesystem collaborator failure.
///
/// `NotFound` is expected during cleanup and handled as "already gone";
/// `Io` is an unlink/stat failure that aborts one record's reconciliation.
#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("file {0} not found")]
    NotFound(PathBuf),

    #[error("filesystem operation on {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileSystemError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}

/// Scheduler registration/control errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid schedule '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },

    #[error("job '{0}' is already registered")]
    DuplicateJob(String),

    #[error("job '{0}' is not registered")]
    UnknownJob(String),
}

/// Failure of one job action invocation.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("{failed} of {total} records could not be purged")]
    Incomplete { failed: usize, total: usize },

    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error("failed to spawn job process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("job process exited with {}", describe_exit(.code))]
    Exit { code: Option<i32> },

    #[error("job panicked: {0}")]
    Panicked(String),
}

/// Failure reconciling one soft-deleted record (or listing them).
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error("reconciliation aborted: {0}")]
    Aborted(String),
}

/// Supervisor-side failures. None of these are fatal once workers run.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to launch worker #{index}: {source}")]
    Launch {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

/// A worker exited abnormally. Only ever logged; the supervisor respawns.
#[derive(Debug, Error)]
#[error("worker #{index} (pid {}) crashed with {}", describe_pid(.pid), describe_exit(.code))]
pub struct WorkerCrash {
    pub index: usize,
    pub pid: Option<u32>,
    pub code: Option<i32>,
}

pub(crate) fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

fn describe_pid(pid: &Option<u32>) -> String {
    match pid {
        Some(p) => p.to_string(),
        None => "?".to_string(),
    }
}

/// An upload the policy refuses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("file type of '{name}' ({mimetype}) is not allowed")]
    NotAllowed { name: String, mimetype: String },

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

/// Anything that stops the coordinator from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}
