//! Periodic scheduler
//!
//! A timer thread wakes once per period, bumps the tick counter and hands
//! every task whose [`ScheduledTask::should_run`] accepts the tick to a small
//! worker pool over a flume channel. A task whose previous run has not
//! finished is skipped for that tick. Task failures are logged per tick and
//! never stop the loop.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::RwLock;

pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &str;

    /// Whether to run on tick `tick` (the first tick is 0)
    fn should_run(&self, tick: u64) -> bool;

    fn run(&self, tick: u64) -> anyhow::Result<()>;
}

/// Runs on every tick
pub fn every_tick(_tick: u64) -> bool {
    true
}

/// Runs on ticks `0, n, 2n, ...`
pub fn every_nth_tick(tick: u64, n: u64) -> bool {
    n != 0 && tick % n == 0
}

#[derive(Clone)]
struct Registered {
    task: Arc<dyn ScheduledTask>,
    /// Queued or running
    in_flight: Arc<AtomicBool>,
}

type TaskList = Arc<RwLock<Vec<Registered>>>;

pub struct Scheduler {
    name: String,
    tasks: TaskList,
    ticks: Arc<AtomicU64>,
    stop_tx: Option<flume::Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("tasks", &self.tasks.read().len())
            .field("ticks", &self.ticks())
            .finish()
    }
}

impl Scheduler {
    pub fn start(name: &str, period: Duration, workers: usize) -> io::Result<Self> {
        let tasks: TaskList = Arc::new(RwLock::new(Vec::new()));
        let ticks = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let (job_tx, job_rx) = flume::unbounded::<(u64, Registered)>();

        let mut threads = Vec::with_capacity(workers.max(1) + 1);
        for index in 0..workers.max(1) {
            let job_rx = job_rx.clone();
            let scheduler = name.to_string();
            threads.push(
                thread::Builder::new()
                    .name(format!("{name}-{index}"))
                    .spawn(move || {
                        for (tick, job) in job_rx.iter() {
                            run_task(&scheduler, tick, job.task.as_ref());
                            job.in_flight.store(false, Ordering::Release);
                        }
                    })?,
            );
        }

        let timer_tasks = tasks.clone();
        let timer_ticks = ticks.clone();
        let scheduler = name.to_string();
        threads.push(
            thread::Builder::new()
                .name(format!("{name}-timer"))
                .spawn(move || loop {
                    match stop_rx.recv_timeout(period) {
                        Err(flume::RecvTimeoutError::Timeout) => {
                            let tick = timer_ticks.fetch_add(1, Ordering::SeqCst);
                            for job in timer_tasks.read().iter() {
                                if !job.task.should_run(tick) {
                                    continue;
                                }
                                if job.in_flight.swap(true, Ordering::AcqRel) {
                                    tracing::trace!(
                                        scheduler = %scheduler,
                                        tick,
                                        task = job.task.name(),
                                        "previous run not finished, skipped"
                                    );
                                    continue;
                                }
                                if job_tx.send((tick, job.clone())).is_err() {
                                    return;
                                }
                            }
                        }
                        // stop requested, or the scheduler handle is gone
                        Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => return,
                    }
                })?,
        );

        tracing::debug!(scheduler = name, period_ms = period.as_millis() as u64, workers, "scheduler started");
        Ok(Self {
            name: name.to_string(),
            tasks,
            ticks,
            stop_tx: Some(stop_tx),
            threads,
        })
    }

    pub fn register(&self, task: Arc<dyn ScheduledTask>) {
        tracing::debug!(scheduler = %self.name, task = task.name(), "registered scheduled task");
        self.tasks.write().push(Registered {
            task,
            in_flight: Arc::new(AtomicBool::new(false)),
        });
    }

    /// Ticks elapsed so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Stop the timer and wait for in-flight tasks; idempotent
    pub fn stop(&mut self) {
        let Some(stop_tx) = self.stop_tx.take() else {
            return;
        };
        let _ = stop_tx.send(());
        drop(stop_tx);
        for handle in self.threads.drain(..) {
            // stopped from one of our own threads: it exits on its own
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!(scheduler = %self.name, "scheduler thread panicked");
            }
        }
        tracing::debug!(scheduler = %self.name, "scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_task(scheduler: &str, tick: u64, task: &dyn ScheduledTask) {
    match panic::catch_unwind(AssertUnwindSafe(|| task.run(tick))) {
        Ok(Ok(())) => {
            tracing::trace!(scheduler, tick, task = task.name(), "scheduled task done");
        }
        Ok(Err(error)) => {
            tracing::warn!(scheduler, tick, task = task.name(), error = %error, "scheduled task failed");
        }
        Err(_) => {
            tracing::error!(scheduler, tick, task = task.name(), "scheduled task panicked");
        }
    }
}
