//! Worker slot bookkeeping owned by the supervisor.

/// Liveness of a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Alive,
    /// Graceful stop requested; waiting for the process to exit.
    Disconnecting,
    Exited,
}

/// One logical worker. The index is stable across respawns; the
/// generation counts how many processes have filled the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSlot {
    pub index: usize,
    pub generation: u32,
    pub pid: Option<u32>,
    pub state: WorkerState,
}

impl WorkerSlot {
    pub fn alive(index: usize, generation: u32, pid: Option<u32>) -> Self {
        Self {
            index,
            generation,
            pid,
            state: WorkerState::Alive,
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.state, WorkerState::Alive | WorkerState::Disconnecting)
    }
}

/// A worker process went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub index: usize,
    pub generation: u32,
    pub pid: Option<u32>,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl WorkerExit {
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}
