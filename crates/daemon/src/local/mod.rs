//! Local replicas of remote files
//!
//! Replicas live under the cache directory at a path derived from the hash
//! of the namespace path. Reconciliation compares a replica with the remote
//! record and decides what, if anything, must happen before it can be used.

mod cache_path;
mod reconcile;
mod replica;

pub use cache_path::{cache_file_path, ensure_parent, remove_cache_file, remove_stale_files, CleanupStats};
pub use reconcile::{apply, decide, reconcile, verify_size, ReconciliationAction, ReplicaError};
pub use replica::{stamp_times, timestamps_match, touch_accessed, LocalReplicaState};
