//! Interval scheduler with tolerance-based wake-up coalescing.
//!
//! One timer thread computes the next wake-up with the pure planner in
//! [`planner`], parks on a condvar until then (register/unregister wake it
//! early), and hands due tasks to a small worker pool over a
//! crossbeam channel. A task whose previous run is still executing is
//! skipped for that trigger, never queued behind itself.

pub mod planner;

use crate::bus::producer::same_instance;
use crate::clock::Clock;
use crate::error::{PipelineError, Result};
use planner::{due_at, plan_next, PlannedTask};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Work the scheduler can trigger periodically.
///
/// Identity is `Arc` pointer identity: registering the same instance again
/// replaces its schedule, a second instance of the same type is a second
/// task.
pub trait ScheduledTask: Send + Sync {
    /// Stable name, used for logging only.
    fn name(&self) -> &str;

    /// One execution. An error is logged and the task stays scheduled.
    fn run(&self) -> Result<()>;
}

struct Entry {
    id: u64,
    task: Arc<dyn ScheduledTask>,
    interval: i64,
    tolerance: i64,
    next_due: i64,
    /// True while a triggered run has not finished yet.
    in_flight: Arc<AtomicBool>,
}

impl Entry {
    fn planned(&self) -> PlannedTask {
        PlannedTask {
            id: self.id,
            next_due: self.next_due,
            interval: self.interval,
            tolerance: self.tolerance,
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    entries: Vec<Entry>,
    next_id: u64,
}

struct Shared {
    clock: Arc<dyn Clock>,
    state: Mutex<SchedulerState>,
    wake: Condvar,
    running: AtomicBool,
}

enum Job {
    Run {
        task: Arc<dyn ScheduledTask>,
        in_flight: Arc<AtomicBool>,
    },
    Shutdown,
}

/// Timer thread + worker pool executing [`ScheduledTask`]s.
pub struct Scheduler {
    shared: Arc<Shared>,
    job_tx: crossbeam_channel::Sender<Job>,
    job_rx: crossbeam_channel::Receiver<Job>,
    worker_count: usize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, worker_count: usize) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        Self {
            shared: Arc::new(Shared {
                clock,
                state: Mutex::new(SchedulerState::default()),
                wake: Condvar::new(),
                running: AtomicBool::new(false),
            }),
            job_tx,
            job_rx,
            worker_count: worker_count.max(1),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn shared(clock: Arc<dyn Clock>, worker_count: usize) -> Arc<Self> {
        Arc::new(Self::new(clock, worker_count))
    }

    /// Schedule `task` every `interval` ms with the given tolerance.
    ///
    /// Re-registering the same instance replaces its schedule; the first
    /// trigger of the new schedule is one full interval away.
    pub fn register(
        &self,
        task: Arc<dyn ScheduledTask>,
        interval: i64,
        tolerance: i64,
    ) -> Result<()> {
        if interval <= 0 {
            return Err(PipelineError::Task(format!(
                "interval for task '{}' must be positive (got {interval}ms)",
                task.name()
            )));
        }
        if tolerance < 0 {
            return Err(PipelineError::Task(format!(
                "tolerance for task '{}' must not be negative (got {tolerance}ms)",
                task.name()
            )));
        }

        let next_due = self.shared.clock.now_ms() + interval;
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = state
            .entries
            .iter_mut()
            .find(|e| same_instance(&e.task, &task))
        {
            tracing::debug!(task = task.name(), interval, "replacing task schedule");
            entry.interval = interval;
            entry.tolerance = tolerance;
            entry.next_due = next_due;
        } else {
            tracing::debug!(task = task.name(), interval, tolerance, "scheduling task");
            let id = state.next_id;
            state.next_id += 1;
            state.entries.push(Entry {
                id,
                task,
                interval,
                tolerance,
                next_due,
                in_flight: Arc::new(AtomicBool::new(false)),
            });
        }
        drop(state);
        self.shared.wake.notify_all();
        Ok(())
    }

    /// Cancel future triggers of `task`. A run already in flight completes.
    /// Returns `true` if the task was scheduled.
    pub fn unregister(&self, task: &Arc<dyn ScheduledTask>) -> bool {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.entries.len();
        state.entries.retain(|e| !same_instance(&e.task, task));
        let removed = state.entries.len() != before;
        drop(state);
        if removed {
            tracing::debug!(task = task.name(), "task unscheduled");
            self.shared.wake.notify_all();
        }
        removed
    }

    pub fn is_registered(&self, task: &Arc<dyn ScheduledTask>) -> bool {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .iter()
            .any(|e| same_instance(&e.task, task))
    }

    pub fn task_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    /// Spawn the timer thread and worker pool. Idempotent.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(workers = self.worker_count, "scheduler starting");
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..self.worker_count {
            let rx = self.job_rx.clone();
            threads.push(std::thread::spawn(move || worker_loop(rx)));
        }
        let shared = Arc::clone(&self.shared);
        let tx = self.job_tx.clone();
        threads.push(std::thread::spawn(move || timer_loop(shared, tx)));
    }

    /// Stop the timer and workers. Registered schedules are kept and take
    /// effect again on the next `start`.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("scheduler stopping");
        self.shared.wake.notify_all();
        for _ in 0..self.worker_count {
            let _ = self.job_tx.send(Job::Shutdown);
        }
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(rx: crossbeam_channel::Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Shutdown => break,
            Job::Run { task, in_flight } => {
                if let Err(e) = task.run() {
                    tracing::warn!(task = task.name(), "scheduled task failed: {}", e);
                }
                in_flight.store(false, Ordering::SeqCst);
            }
        }
    }
}

fn timer_loop(shared: Arc<Shared>, job_tx: crossbeam_channel::Sender<Job>) {
    let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
    while shared.running.load(Ordering::SeqCst) {
        let now = shared.clock.now_ms();

        let planned: Vec<PlannedTask> = state.entries.iter().map(Entry::planned).collect();
        for id in due_at(&planned, now) {
            let Some(entry) = state.entries.iter_mut().find(|e| e.id == id) else {
                continue;
            };
            // re-arm relative to the actual wake, not the nominal due time
            entry.next_due = now + entry.interval;
            if entry
                .in_flight
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let _ = job_tx.send(Job::Run {
                    task: Arc::clone(&entry.task),
                    in_flight: Arc::clone(&entry.in_flight),
                });
            } else {
                tracing::debug!(
                    task = entry.task.name(),
                    "previous run still in flight, skipping trigger"
                );
            }
        }

        let planned: Vec<PlannedTask> = state.entries.iter().map(Entry::planned).collect();
        state = match plan_next(&planned) {
            Some(plan) => {
                let wait = plan.wake_at - shared.clock.now_ms();
                if wait <= 0 {
                    continue;
                }
                let (guard, _) = shared
                    .wake
                    .wait_timeout(state, Duration::from_millis(wait as u64))
                    .unwrap_or_else(|e| e.into_inner());
                guard
            }
            None => shared
                .wake
                .wait(state)
                .unwrap_or_else(|e| e.into_inner()),
        };
    }
}
