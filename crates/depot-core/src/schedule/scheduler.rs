//! Scheduler - 名前付きジョブを cron のタイミングで起動する
//!
//! # フロー
//! 1. `register` で式を検証し、名前 -> (スケジュール, アクション,
//!    実行中フラグ) を登録
//! 2. `start` / `start_all` でジョブを有効化
//! 3. `run` は1秒に数回起き、経過した壁時計の秒ごとに `tick` を呼ぶ
//!    (同じ秒を二度評価せず、飛ばしもしない)
//! 4. `tick` は式に一致した有効なジョブのアクションを spawn
//!
//! # 重複実行
//! 前回の実行が終わっていないジョブはその tick をスキップする。
//! スキップはログに出し、`JobEvent::Skipped` として配信する。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::domain::{JobDescriptor, JobEvent, RunOutcome};
use crate::error::{JobError, SchedulerError};
use crate::ports::{Clock, JobAction};

use super::cron::CronExpr;

const EVENT_CAPACITY: usize = 64;
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Longest gap (e.g. after a suspend) the clock loop replays second by
/// second. Older seconds are dropped.
const MAX_CATCH_UP_SECS: i64 = 300;

/// Result of `register_once`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    AlreadyRegistered,
}

/// What `tick` did for one job.
#[derive(Debug)]
pub enum Dispatch {
    Spawned { job: String, handle: JoinHandle<()> },
    Skipped { job: String },
}

struct JobEntry {
    schedule: CronExpr,
    action: Arc<dyn JobAction>,
    started: AtomicBool,
    running: Arc<AtomicBool>,
    last_tick: Mutex<Option<NaiveDateTime>>,
}

pub struct Scheduler {
    jobs: Mutex<HashMap<String, Arc<JobEntry>>>,
    events: broadcast::Sender<JobEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            jobs: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Register a job. Fails on a malformed expression or a taken name.
    pub fn register(
        &self,
        name: impl Into<String>,
        expr: &str,
        action: Arc<dyn JobAction>,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        let schedule = CronExpr::parse(expr)?;
        let mut jobs = lock(&self.jobs);
        if jobs.contains_key(&name) {
            return Err(SchedulerError::DuplicateJob(name));
        }
        jobs.insert(
            name,
            Arc::new(JobEntry {
                schedule,
                action,
                started: AtomicBool::new(false),
                running: Arc::new(AtomicBool::new(false)),
                last_tick: Mutex::new(None),
            }),
        );
        Ok(())
    }

    /// Register unless the name is taken; a taken name is a no-op.
    pub fn register_once(
        &self,
        name: impl Into<String>,
        expr: &str,
        action: Arc<dyn JobAction>,
    ) -> Result<Registration, SchedulerError> {
        let name = name.into();
        match self.register(name.clone(), expr, action) {
            Ok(()) => {
                tracing::info!(job = %name, schedule = %expr, "job registered");
                Ok(Registration::Added)
            }
            Err(SchedulerError::DuplicateJob(_)) => {
                tracing::debug!(job = %name, "job already registered, skipping");
                Ok(Registration::AlreadyRegistered)
            }
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        lock(&self.jobs).contains_key(name)
    }

    fn entry(&self, name: &str) -> Result<Arc<JobEntry>, SchedulerError> {
        lock(&self.jobs)
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))
    }

    pub fn start(&self, name: &str) -> Result<(), SchedulerError> {
        let entry = self.entry(name)?;
        if !entry.started.swap(true, Ordering::AcqRel) {
            tracing::info!(job = %name, schedule = %entry.schedule, "job started");
        }
        Ok(())
    }

    pub fn start_all(&self) {
        let names: Vec<String> = lock(&self.jobs).keys().cloned().collect();
        for name in names {
            // names were just read from the map and jobs are never removed
            let _ = self.start(&name);
        }
    }

    /// Disarm a job. A run already in flight is not interrupted.
    pub fn stop(&self, name: &str) -> Result<(), SchedulerError> {
        self.entry(name)?.started.store(false, Ordering::Release);
        Ok(())
    }

    pub fn is_started(&self, name: &str) -> Result<bool, SchedulerError> {
        Ok(self.entry(name)?.started.load(Ordering::Acquire))
    }

    /// Is an invocation of `name` currently in flight?
    pub fn is_running(&self, name: &str) -> Result<bool, SchedulerError> {
        Ok(self.entry(name)?.running.load(Ordering::Acquire))
    }

    pub fn descriptors(&self) -> Vec<JobDescriptor> {
        let mut out: Vec<JobDescriptor> = lock(&self.jobs)
            .iter()
            .map(|(name, entry)| JobDescriptor::new(name.clone(), entry.schedule.to_string()))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Evaluate every armed job against one wall-clock second and
    /// dispatch the matching ones. Must be called inside a tokio runtime.
    pub fn tick(&self, at: NaiveDateTime) -> Vec<Dispatch> {
        let at = at.with_nanosecond(0).unwrap_or(at);
        let due: Vec<(String, Arc<JobEntry>)> = lock(&self.jobs)
            .iter()
            .filter(|(_, entry)| entry.started.load(Ordering::Acquire))
            .filter(|(_, entry)| entry.schedule.matches(&at))
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();

        let mut dispatched = Vec::with_capacity(due.len());
        for (name, entry) in due {
            {
                let mut last = lock(&entry.last_tick);
                if *last == Some(at) {
                    continue;
                }
                *last = Some(at);
            }

            if entry
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                tracing::warn!(
                    job = %name,
                    schedule = %entry.schedule,
                    tick = %at,
                    "previous run still in progress, skipping this tick"
                );
                let _ = self.events.send(JobEvent::Skipped {
                    job: name.clone(),
                    tick: at,
                });
                dispatched.push(Dispatch::Skipped { job: name });
                continue;
            }

            tracing::info!(job = %name, schedule = %entry.schedule, tick = %at, "dispatching job");
            let handle = self.spawn_run(name.clone(), &entry, at);
            dispatched.push(Dispatch::Spawned { job: name, handle });
        }
        dispatched
    }

    fn spawn_run(&self, name: String, entry: &JobEntry, tick: NaiveDateTime) -> JoinHandle<()> {
        let action = Arc::clone(&entry.action);
        let running = Arc::clone(&entry.running);
        let events = self.events.clone();
        let _ = events.send(JobEvent::Started {
            job: name.clone(),
            tick,
        });

        tokio::spawn(async move {
            // inner task so a panicking action surfaces as a JoinError
            let result = tokio::spawn(async move { action.run().await }).await;
            let outcome = match result {
                Ok(Ok(())) => {
                    tracing::info!(job = %name, "job finished");
                    RunOutcome::Succeeded
                }
                Ok(Err(e)) => {
                    tracing::error!(job = %name, error = %e, "job failed");
                    RunOutcome::Failed(e.to_string())
                }
                Err(join) => {
                    let e = JobError::Panicked(join.to_string());
                    tracing::error!(job = %name, error = %e, "job aborted");
                    RunOutcome::Failed(e.to_string())
                }
            };
            running.store(false, Ordering::Release);
            let _ = events.send(JobEvent::Finished {
                job: name,
                tick,
                outcome,
            });
        })
    }

    /// Clock loop. Evaluates each local wall-clock second once until
    /// `shutdown` flips to true. In-flight runs are left to finish.
    pub async fn run<C: Clock>(self: Arc<Self>, clock: C, mut shutdown: watch::Receiver<bool>) {
        let local_now = |clock: &C| {
            let now = clock.now().with_timezone(&Local).naive_local();
            now.with_nanosecond(0).unwrap_or(now)
        };

        let mut last = local_now(&clock);
        self.tick(last);
        tracing::debug!(jobs = self.descriptors().len(), "scheduler clock running");

        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            let now = local_now(&clock);
            let behind = (now - last).num_seconds();
            if behind <= 0 {
                // same second, or the wall clock went backwards
                last = last.max(now);
                continue;
            }
            if behind > MAX_CATCH_UP_SECS {
                tracing::warn!(seconds = behind, "scheduler clock fell behind, dropping missed ticks");
                last = now - chrono::Duration::seconds(MAX_CATCH_UP_SECS);
            }
            while last < now {
                last += chrono::Duration::seconds(1);
                self.tick(last);
            }
        }
        tracing::debug!("scheduler clock stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[derive(Default)]
    struct CountingAction {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobAction for CountingAction {
        async fn run(&self) -> Result<(), JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Blocks until the test releases a permit.
    struct GatedAction {
        gate: Arc<Semaphore>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobAction for GatedAction {
        async fn run(&self) -> Result<(), JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| JobError::Failed(e.to_string()))?;
            permit.forget();
            Ok(())
        }
    }

    struct FailingAction;

    #[async_trait]
    impl JobAction for FailingAction {
        async fn run(&self) -> Result<(), JobError> {
            Err(JobError::Failed("boom".to_string()))
        }
    }

    struct PanickingAction;

    #[async_trait]
    impl JobAction for PanickingAction {
        async fn run(&self) -> Result<(), JobError> {
            panic!("job exploded");
        }
    }

    async fn settle(dispatches: Vec<Dispatch>) {
        for d in dispatches {
            if let Dispatch::Spawned { handle, .. } = d {
                handle.await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn fires_once_at_23_30_and_not_again() {
        let scheduler = Scheduler::new();
        let action = Arc::new(CountingAction::default());
        scheduler
            .register("cleanup", "30 23 * * *", action.clone())
            .unwrap();
        scheduler.start("cleanup").unwrap();

        settle(scheduler.tick(at(23, 29, 59))).await;
        settle(scheduler.tick(at(23, 30, 0))).await;
        // the same second evaluated twice still fires once
        settle(scheduler.tick(at(23, 30, 0))).await;
        settle(scheduler.tick(at(23, 30, 59))).await;
        settle(scheduler.tick(at(23, 31, 0))).await;

        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unstarted_jobs_do_not_fire() {
        let scheduler = Scheduler::new();
        let action = Arc::new(CountingAction::default());
        scheduler.register("job", "* * * * * *", action.clone()).unwrap();

        assert!(scheduler.tick(at(1, 2, 3)).is_empty());

        scheduler.start_all();
        settle(scheduler.tick(at(1, 2, 4))).await;
        scheduler.stop("job").unwrap();
        assert!(scheduler.tick(at(1, 2, 5)).is_empty());

        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_no_op() {
        let scheduler = Scheduler::new();
        let first = Arc::new(CountingAction::default());
        let second = Arc::new(CountingAction::default());

        assert_eq!(
            scheduler
                .register_once("job", "* * * * * *", first.clone())
                .unwrap(),
            Registration::Added
        );
        assert_eq!(
            scheduler
                .register_once("job", "* * * * * *", second.clone())
                .unwrap(),
            Registration::AlreadyRegistered
        );
        assert!(matches!(
            scheduler.register("job", "* * * * * *", second.clone()),
            Err(SchedulerError::DuplicateJob(_))
        ));

        scheduler.start("job").unwrap();
        scheduler.start("job").unwrap();
        let dispatches = scheduler.tick(at(0, 0, 1));
        assert_eq!(dispatches.len(), 1);
        settle(dispatches).await;

        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.descriptors().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let scheduler = Scheduler::new();
        let gate = Arc::new(Semaphore::new(0));
        let action = Arc::new(GatedAction {
            gate: gate.clone(),
            calls: AtomicUsize::new(0),
        });
        scheduler.register("slow", "* * * * * *", action.clone()).unwrap();
        scheduler.start("slow").unwrap();
        let mut events = scheduler.subscribe();

        let first = scheduler.tick(at(0, 0, 1));
        assert!(matches!(first[0], Dispatch::Spawned { .. }));
        assert!(scheduler.is_running("slow").unwrap());

        let second = scheduler.tick(at(0, 0, 2));
        assert!(matches!(second[0], Dispatch::Skipped { .. }));

        gate.add_permits(1);
        settle(first).await;
        assert!(!scheduler.is_running("slow").unwrap());

        let third = scheduler.tick(at(0, 0, 3));
        assert!(matches!(third[0], Dispatch::Spawned { .. }));
        gate.add_permits(1);
        settle(third).await;

        assert_eq!(action.calls.load(Ordering::SeqCst), 2);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                JobEvent::Started { job: "slow".into(), tick: at(0, 0, 1) },
                JobEvent::Skipped { job: "slow".into(), tick: at(0, 0, 2) },
                JobEvent::Finished {
                    job: "slow".into(),
                    tick: at(0, 0, 1),
                    outcome: RunOutcome::Succeeded
                },
                JobEvent::Started { job: "slow".into(), tick: at(0, 0, 3) },
                JobEvent::Finished {
                    job: "slow".into(),
                    tick: at(0, 0, 3),
                    outcome: RunOutcome::Succeeded
                },
            ]
        );
    }

    #[tokio::test]
    async fn failing_and_panicking_actions_do_not_stop_ticks() {
        let scheduler = Scheduler::new();
        scheduler
            .register("fails", "* * * * * *", Arc::new(FailingAction))
            .unwrap();
        scheduler
            .register("panics", "* * * * * *", Arc::new(PanickingAction))
            .unwrap();
        scheduler.start_all();
        let mut events = scheduler.subscribe();

        settle(scheduler.tick(at(0, 0, 1))).await;
        let again = scheduler.tick(at(0, 0, 2));
        assert_eq!(again.len(), 2);
        assert!(again.iter().all(|d| matches!(d, Dispatch::Spawned { .. })));
        settle(again).await;

        let mut failures = 0;
        while let Ok(event) = events.try_recv() {
            if let JobEvent::Finished { outcome, .. } = event {
                assert!(!outcome.is_success());
                failures += 1;
            }
        }
        assert_eq!(failures, 4);
    }

    #[tokio::test]
    async fn unknown_job_and_bad_schedule() {
        let scheduler = Scheduler::new();
        assert!(matches!(
            scheduler.start("nope"),
            Err(SchedulerError::UnknownJob(name)) if name == "nope"
        ));
        assert!(matches!(
            scheduler.register("bad", "61 * * * *", Arc::new(CountingAction::default())),
            Err(SchedulerError::InvalidSchedule { .. })
        ));
        assert!(!scheduler.exists("bad"));
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let scheduler = Arc::new(Scheduler::new());
        let action = Arc::new(CountingAction::default());
        scheduler.register("every_second", "* * * * * *", action.clone()).unwrap();
        scheduler.start_all();

        let (tx, rx) = watch::channel(false);
        let clock_task = tokio::spawn(Arc::clone(&scheduler).run(crate::ports::SystemClock, rx));

        tokio::time::sleep(Duration::from_millis(1300)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), clock_task)
            .await
            .unwrap()
            .unwrap();

        assert!(action.calls.load(Ordering::SeqCst) >= 1);
    }
}
