use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use sha2::{Digest, Sha256};

use common::object::ObjectIdentity;

/// `<cache_dir>/<first two hex digits>/<remaining digits>` of the SHA-256
/// of the file-form namespace path
pub fn cache_file_path(cache_dir: &Path, identity: &ObjectIdentity) -> PathBuf {
    let digest = hex::encode(Sha256::digest(identity.to_file_form().to_string().as_bytes()));
    let (shard, rest) = digest.split_at(2);
    cache_dir.join(shard).join(rest)
}

pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => std::fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Returns whether a file was removed
pub fn remove_cache_file(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub scanned: usize,
    pub removed: usize,
    /// Stale files kept because they were in use
    pub in_use: usize,
    pub failed: usize,
}

fn idle_for(metadata: &std::fs::Metadata, now: SystemTime) -> Duration {
    let last_used = metadata
        .accessed()
        .or_else(|_| metadata.modified())
        .unwrap_or(now);
    now.duration_since(last_used).unwrap_or_default()
}

/// Delete cache files whose last access is older than `retention`
///
/// `claim` is called for each stale file. It returns a guard held while the
/// file is checked again and removed, or `None` when the file must stay.
pub fn remove_stale_files<G>(
    cache_dir: &Path,
    retention: Duration,
    mut claim: impl FnMut(&Path) -> Option<G>,
) -> io::Result<CleanupStats> {
    let mut stats = CleanupStats::default();
    let now = SystemTime::now();

    let shards = match std::fs::read_dir(cache_dir) {
        Ok(shards) => shards,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(stats),
        Err(e) => return Err(e),
    };

    for shard in shards {
        let shard = shard?;
        if !shard.file_type()?.is_dir() {
            continue;
        }
        for file in std::fs::read_dir(shard.path())? {
            let file = file?;
            let metadata = file.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            stats.scanned += 1;
            if idle_for(&metadata, now) <= retention {
                continue;
            }

            let path = file.path();
            let Some(_guard) = claim(&path) else {
                stats.in_use += 1;
                continue;
            };
            // may have been used while waiting for the claim
            let idle = match std::fs::metadata(&path) {
                Ok(metadata) => idle_for(&metadata, SystemTime::now()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if idle <= retention {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    stats.removed += 1;
                    tracing::debug!(path = %path.display(), idle_secs = idle.as_secs(), "removed stale cache file");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove cache file");
                }
            }
        }
    }
    Ok(stats)
}
