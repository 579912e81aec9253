//! Shared building blocks for bucketfs.
//!
//! - [`object`]: how a bucket/key namespace maps onto filesystem paths and
//!   the immutable metadata records handed to filesystem callers
//! - [`client`]: the provider-agnostic object storage interface, plus an
//!   in-memory implementation
//! - [`sync`]: per-name mutual exclusion
//! - [`worker`]: the on-demand task queue and the periodic scheduler

pub mod client;
pub mod object;
pub mod sync;
pub mod worker;

pub mod prelude {
    pub use crate::client::{ClientError, ObjectClient, ObjectReader, PutAttributes};
    pub use crate::object::{EntryKind, MetadataRecord, ObjectIdentity, PathError};
    pub use crate::sync::{NamedLockGuard, NamedLockRegistry};
    pub use crate::worker::{
        DedupPolicy, Enqueued, OnDemandTask, Priority, ScheduledTask, Scheduler, TaskQueue,
    };
}
