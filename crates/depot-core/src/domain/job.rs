//! Job descriptors and the events a scheduled job run emits.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Job name -> cron expression, as read from the schedule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub name: String,
    pub schedule: String,
}

impl JobDescriptor {
    pub fn new(name: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
        }
    }
}

/// How one job run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed(String),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

/// Published by the scheduler for every dispatch decision.
///
/// State transitions for one tick of one job:
/// - Started -> Finished
/// - Skipped (previous run still in flight)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Started {
        job: String,
        tick: NaiveDateTime,
    },
    Finished {
        job: String,
        tick: NaiveDateTime,
        outcome: RunOutcome,
    },
    Skipped {
        job: String,
        tick: NaiveDateTime,
    },
}

impl JobEvent {
    pub fn job(&self) -> &str {
        match self {
            JobEvent::Started { job, .. }
            | JobEvent::Finished { job, .. }
            | JobEvent::Skipped { job, .. } => job,
        }
    }
}
