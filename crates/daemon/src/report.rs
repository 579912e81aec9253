//! Diagnostic snapshot of a mounted filesystem

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use common::sync::NamedLockRegistry;
use common::worker::TaskQueueStats;

use crate::cache::{BucketCacheReport, CacheReport};

#[derive(Debug, Clone, Serialize)]
pub struct LockReport {
    pub purpose: &'static str,
    /// Live names with their holder plus waiter counts
    pub held: Vec<(String, usize)>,
}

impl LockReport {
    pub fn snapshot(registry: &NamedLockRegistry) -> Self {
        Self {
            purpose: registry.purpose(),
            held: registry.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FsReport {
    pub generated_at: DateTime<Utc>,
    pub mounted_at: DateTime<Utc>,
    pub readonly: bool,
    pub buckets: BucketCacheReport,
    pub objects: CacheReport,
    pub locks: Vec<LockReport>,
    pub task_queue: TaskQueueStats,
    pub scheduler_ticks: Option<u64>,
    /// Local replicas behind open file handles
    pub open_replicas: usize,
}

impl FsReport {
    /// `report-<timestamp>.json` inside `dir`
    pub fn file_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!(
            "report-{}.json",
            self.generated_at.format("%Y%m%dT%H%M%S%.3fZ")
        ))
    }

    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = self.file_path(dir);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}
