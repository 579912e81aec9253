//! Priority task queue drained by a fixed pool of worker threads
//!
//! Tasks are ordered by priority, then by submission order. A task may carry
//! a synonym; submitting with [`DedupPolicy::SkipIfPending`] drops the new
//! task when one with the same synonym is still waiting.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Priority {
    Low,
    Middle,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    Always,
    SkipIfPending,
}

/// What happened to a submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// An equivalent task is already waiting
    Skipped,
    /// The queue is stopped; the task was cancelled
    Rejected,
}

pub trait OnDemandTask: Send {
    fn name(&self) -> &str;

    /// Identity used for deduplication
    fn synonym(&self) -> Option<String> {
        None
    }

    fn run(&mut self, worker: usize) -> anyhow::Result<()>;

    /// Called instead of `run` when the queue shuts down first
    fn cancelled(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskQueueStats {
    pub queued: u64,
    pub pending: usize,
    pub executed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub cancelled: u64,
}

struct QueuedTask {
    priority: Priority,
    seq: u64,
    synonym: Option<String>,
    task: Box<dyn OnDemandTask>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // max-heap: higher priority first, then lower sequence number
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
    shutdown: bool,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    cancelled: AtomicU64,
}

struct Shared {
    name: String,
    state: Mutex<QueueState>,
    available: Condvar,
    counters: Counters,
}

pub struct TaskQueue {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.shared.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl TaskQueue {
    /// Spawn `workers` threads named `<name>-<index>`
    pub fn start(name: &str, workers: usize) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            name: name.to_string(),
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            counters: Counters::default(),
        });

        let queue = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(workers)),
        };

        for index in 0..workers.max(1) {
            let shared = queue.shared.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(shared, index))?;
            queue.workers.lock().push(handle);
        }

        tracing::debug!(queue = name, workers, "task queue started");
        Ok(queue)
    }

    pub fn add_task(
        &self,
        mut task: Box<dyn OnDemandTask>,
        priority: Priority,
        dedup: DedupPolicy,
    ) -> Enqueued {
        let synonym = task.synonym();
        let mut state = self.shared.state.lock();

        if state.shutdown {
            drop(state);
            tracing::debug!(task = task.name(), "queue stopped, cancelling task");
            task.cancelled();
            self.shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            return Enqueued::Rejected;
        }

        if dedup == DedupPolicy::SkipIfPending {
            if let Some(synonym) = &synonym {
                let pending = state
                    .heap
                    .iter()
                    .any(|queued| queued.synonym.as_ref() == Some(synonym));
                if pending {
                    self.shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(task = task.name(), synonym = %synonym, "equivalent task pending");
                    return Enqueued::Skipped;
                }
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(QueuedTask {
            priority,
            seq,
            synonym,
            task,
        });
        drop(state);

        self.shared.counters.queued.fetch_add(1, Ordering::Relaxed);
        self.shared.available.notify_one();
        Enqueued::Queued
    }

    pub fn stats(&self) -> TaskQueueStats {
        let c = &self.shared.counters;
        TaskQueueStats {
            queued: c.queued.load(Ordering::Relaxed),
            pending: self.shared.state.lock().heap.len(),
            executed: c.executed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Stop the workers and cancel whatever is still queued
    ///
    /// Tasks already running are allowed to finish. Safe to call repeatedly.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown && self.workers.lock().is_empty() {
                return;
            }
            state.shutdown = true;
        }
        self.shared.available.notify_all();

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            // stopped from one of our own threads: it exits on its own
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!(queue = %self.shared.name, "worker thread panicked");
            }
        }

        let leftover: Vec<_> = {
            let mut state = self.shared.state.lock();
            state.heap.drain().collect()
        };
        for mut queued in leftover {
            queued.task.cancelled();
            self.shared
                .counters
                .cancelled
                .fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(queue = %self.shared.name, "task queue stopped");
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    loop {
        let next = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    break None;
                }
                if let Some(queued) = state.heap.pop() {
                    break Some(queued);
                }
                shared.available.wait(&mut state);
            }
        };

        let Some(mut queued) = next else {
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| queued.task.run(index)));
        match outcome {
            Ok(Ok(())) => {
                shared.counters.executed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(error)) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    queue = %shared.name,
                    worker = index,
                    task = queued.task.name(),
                    error = %error,
                    "task failed"
                );
            }
            Err(_) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    queue = %shared.name,
                    worker = index,
                    task = queued.task.name(),
                    "task panicked"
                );
            }
        }
    }
}
