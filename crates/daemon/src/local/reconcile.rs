use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use serde::Serialize;

use common::object::MetadataRecord;

use super::replica::{stamp_times, touch_accessed, LocalReplicaState};

/// What must happen to a local replica before it can serve reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconciliationAction {
    /// Size and timestamps already agree
    InSync,
    /// Both sides are empty; only the timestamps differ
    SyncTimestampsOnly,
    /// The remote is empty: create or empty the replica
    Truncate,
    /// Fetch the remote content
    Download,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("local replica has {actual} bytes, remote object has {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
}

/// Decision table over local existence/size and remote size
pub fn decide(local: &LocalReplicaState, remote: &MetadataRecord) -> ReconciliationAction {
    if local.matches(remote) {
        return ReconciliationAction::InSync;
    }
    match (local.exists, local.size, remote.size()) {
        (_, _, remote_size) if remote_size > 0 => ReconciliationAction::Download,
        (true, 0, _) => ReconciliationAction::SyncTimestampsOnly,
        _ => ReconciliationAction::Truncate,
    }
}

pub fn reconcile(remote: &MetadataRecord, local_path: &Path) -> io::Result<ReconciliationAction> {
    let local = LocalReplicaState::inspect(local_path)?;
    let action = decide(&local, remote);
    tracing::debug!(
        path = %local_path.display(),
        local_exists = local.exists,
        local_size = local.size,
        remote_size = remote.size(),
        ?action,
        "reconciled local replica"
    );
    Ok(action)
}

/// Perform the local side of `action` and open the replica
///
/// For [`ReconciliationAction::Download`] the replica is created empty; the
/// caller fills it and stamps the remote timestamps afterwards.
pub fn apply(
    action: ReconciliationAction,
    remote: &MetadataRecord,
    local_path: &Path,
) -> io::Result<File> {
    match action {
        ReconciliationAction::InSync => {
            let file = OpenOptions::new().read(true).write(true).open(local_path)?;
            touch_accessed(&file)?;
            Ok(file)
        }
        ReconciliationAction::SyncTimestampsOnly => {
            let file = OpenOptions::new().read(true).write(true).open(local_path)?;
            stamp_times(&file, remote.creation_time(), remote.last_write_time())?;
            Ok(file)
        }
        ReconciliationAction::Truncate => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(local_path)?;
            stamp_times(&file, remote.creation_time(), remote.last_write_time())?;
            Ok(file)
        }
        ReconciliationAction::Download => OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(local_path),
    }
}

/// The replica must be exactly as large as the remote object
pub fn verify_size(file: &File, expected: u64) -> Result<(), ReplicaError> {
    let actual = file.metadata()?.len();
    if actual != expected {
        return Err(ReplicaError::SizeMismatch { expected, actual });
    }
    Ok(())
}
