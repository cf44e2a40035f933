//! Supervisor - N 個の worker プロセスを常駐させる
//!
//! # フロー
//! 1. `start` でスロット (`0..N`) ごとに worker を1つ起動
//! 2. プロセスごとの monitor タスクが終了を待ち `WorkerExit` を送る
//! 3. `step` が次のイベントを処理:
//!    - 停止を頼まれていない worker の異常終了: 同じスロットに1つだけ
//!      代替を起動 (generation を +1)
//!    - 正常終了、または `disconnect` 後の終了: スロットは空のまま
//!    - 代替の起動に失敗した場合はバックオフ後に再試行
//! 4. `run` は shutdown まで `step` を回し、最後に全 worker を
//!    disconnect して終了を待つ
//!
//! Supervisor 自身はリクエストを処理せず、ジョブも実行しない。

use tokio::sync::{mpsc, oneshot, watch};

use crate::domain::{WorkerExit, WorkerSlot, WorkerState};
use crate::error::{ConfigError, SupervisorError, WorkerCrash};
use crate::ports::{WorkerLauncher, WorkerProcess};

use super::retry::RetryPolicy;

enum Event {
    Exited(WorkerExit),
    Relaunch {
        index: usize,
        generation: u32,
        attempt: u32,
    },
}

/// What `handle_exit` did about one exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    /// A replacement is running in the slot.
    Replaced,
    /// The replacement failed to launch; a retry is scheduled.
    ReplacementPending,
    /// Clean exit or requested stop. The slot stays empty.
    Retired,
    /// Exit of a process that no longer owns its slot.
    Ignored,
}

/// One handled supervisor event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Exited { exit: WorkerExit, action: ExitAction },
    Relaunch { index: usize, launched: bool },
    Ignored,
}

pub struct Supervisor<L> {
    launcher: L,
    retry: RetryPolicy,
    slots: Vec<WorkerSlot>,
    stops: Vec<Option<oneshot::Sender<()>>>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    shutting_down: bool,
}

impl<L: WorkerLauncher> Supervisor<L> {
    pub fn new(launcher: L, workers: usize) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::InvalidWorkerCount(workers));
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            launcher,
            retry: RetryPolicy::default(),
            slots: (0..workers)
                .map(|index| WorkerSlot {
                    index,
                    generation: 0,
                    pid: None,
                    state: WorkerState::Exited,
                })
                .collect(),
            stops: (0..workers).map(|_| None).collect(),
            events_tx,
            events_rx,
            shutting_down: false,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn slots(&self) -> &[WorkerSlot] {
        &self.slots
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_alive()).count()
    }

    /// Launch every slot. A failure here is a startup failure.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        tracing::info!(workers = self.slots.len(), "starting workers");
        for index in 0..self.slots.len() {
            self.launch_into(index, 0).await?;
        }
        Ok(())
    }

    async fn launch_into(&mut self, index: usize, generation: u32) -> Result<(), SupervisorError> {
        let process = self.launcher.launch(index).await?;
        let pid = process.pid();
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(monitor(
            index,
            generation,
            process,
            stop_rx,
            self.events_tx.clone(),
        ));
        self.slots[index] = WorkerSlot::alive(index, generation, pid);
        self.stops[index] = Some(stop_tx);
        tracing::info!(worker_index = index, pid, generation, "worker started");
        Ok(())
    }

    async fn replace(&mut self, index: usize, generation: u32, attempt: u32) -> bool {
        match self.launch_into(index, generation).await {
            Ok(()) => true,
            Err(e) => {
                let delay = self.retry.next_delay(attempt);
                tracing::error!(
                    worker_index = index,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "failed to launch replacement worker"
                );
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Event::Relaunch {
                        index,
                        generation,
                        attempt: attempt + 1,
                    });
                });
                false
            }
        }
    }

    /// React to one worker exit.
    pub async fn handle_exit(&mut self, exit: WorkerExit) -> ExitAction {
        let Some(slot) = self.slots.get_mut(exit.index) else {
            return ExitAction::Ignored;
        };
        if slot.generation != exit.generation || slot.state == WorkerState::Exited {
            return ExitAction::Ignored;
        }
        let requested = slot.state == WorkerState::Disconnecting;
        slot.state = WorkerState::Exited;
        slot.pid = None;
        self.stops[exit.index] = None;

        if exit.is_clean() || requested || self.shutting_down {
            tracing::info!(
                worker_index = exit.index,
                pid = exit.pid,
                code = exit.code,
                "worker exited"
            );
            return ExitAction::Retired;
        }

        let crash = WorkerCrash {
            index: exit.index,
            pid: exit.pid,
            code: exit.code,
        };
        tracing::error!(error = %crash, "starting a new worker");
        if self.replace(exit.index, exit.generation + 1, 1).await {
            ExitAction::Replaced
        } else {
            ExitAction::ReplacementPending
        }
    }

    /// Ask a worker to stop. Its exit will not be replaced. Returns false
    /// when the slot has no running worker.
    pub fn disconnect(&mut self, index: usize) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        if slot.state != WorkerState::Alive {
            return false;
        }
        slot.state = WorkerState::Disconnecting;
        if let Some(stop) = self.stops[index].take() {
            let _ = stop.send(());
        }
        tracing::info!(worker_index = index, pid = slot.pid, "disconnecting worker");
        true
    }

    /// Wait for and handle the next event.
    pub async fn step(&mut self) -> Step {
        // the supervisor holds a sender, so the channel never closes
        let Some(event) = self.events_rx.recv().await else {
            return Step::Ignored;
        };
        match event {
            Event::Exited(exit) => {
                let action = self.handle_exit(exit).await;
                Step::Exited { exit, action }
            }
            Event::Relaunch {
                index,
                generation,
                attempt,
            } => {
                let slot = &self.slots[index];
                let pending = slot.state == WorkerState::Exited && slot.generation + 1 == generation;
                if !pending || self.shutting_down {
                    return Step::Ignored;
                }
                let launched = self.replace(index, generation, attempt).await;
                Step::Relaunch { index, launched }
            }
        }
    }

    /// Supervise until `shutdown` flips, then stop every worker.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.step() => {}
            }
        }
        self.shutdown().await;
    }

    /// Disconnect all workers and wait until every one has exited.
    pub async fn shutdown(&mut self) {
        self.shutting_down = true;
        for index in 0..self.slots.len() {
            self.disconnect(index);
        }
        tracing::info!(workers = self.live_count(), "waiting for workers to exit");
        while self.live_count() > 0 {
            self.step().await;
        }
        tracing::info!("all workers stopped");
    }
}

async fn monitor(
    index: usize,
    generation: u32,
    mut process: Box<dyn WorkerProcess>,
    stop: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<Event>,
) {
    let pid = process.pid();
    let waited = tokio::select! {
        waited = process.wait() => waited,
        _ = stop => {
            if let Err(e) = process.terminate().await {
                tracing::warn!(worker_index = index, pid, error = %e, "failed to signal worker");
            }
            process.wait().await
        }
    };
    let code = match waited {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!(worker_index = index, pid, error = %e, "lost track of worker");
            None
        }
    };
    let _ = events.send(Event::Exited(WorkerExit {
        index,
        generation,
        pid,
        code,
    }));
}
