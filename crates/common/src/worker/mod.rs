//! Thread-pool based background work
//!
//! There is no async runtime on this side of the system: the on-demand queue
//! and the periodic scheduler both run plain OS threads.

mod on_demand;
mod scheduled;

pub use on_demand::{DedupPolicy, Enqueued, OnDemandTask, Priority, TaskQueue, TaskQueueStats};
pub use scheduled::{every_nth_tick, every_tick, ScheduledTask, Scheduler};
