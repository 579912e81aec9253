//! Background work submitted by a mounted filesystem
//!
//! Tasks hold a weak handle so the scheduler and queue never keep an
//! unmounted filesystem alive.

use std::sync::Weak;

use common::worker::{every_nth_tick, every_tick, OnDemandTask, ScheduledTask};

use super::bucket_fs::{BucketFs, FsInner};

pub(crate) struct EvictCachesTask {
    fs: Weak<FsInner>,
}

impl EvictCachesTask {
    pub(crate) fn new(fs: Weak<FsInner>) -> Self {
        Self { fs }
    }
}

impl ScheduledTask for EvictCachesTask {
    fn name(&self) -> &str {
        "EvictCaches"
    }

    fn should_run(&self, tick: u64) -> bool {
        every_tick(tick)
    }

    fn run(&self, _tick: u64) -> anyhow::Result<()> {
        if let Some(fs) = BucketFs::upgrade(&self.fs) {
            fs.on_tick();
        }
        Ok(())
    }
}

pub(crate) struct IdleTask {
    fs: Weak<FsInner>,
    every: u64,
}

impl IdleTask {
    pub(crate) fn new(fs: Weak<FsInner>, every: u64) -> Self {
        Self { fs, every }
    }
}

impl ScheduledTask for IdleTask {
    fn name(&self) -> &str {
        "Idle"
    }

    fn should_run(&self, tick: u64) -> bool {
        every_nth_tick(tick, self.every)
    }

    fn run(&self, _tick: u64) -> anyhow::Result<()> {
        if let Some(fs) = BucketFs::upgrade(&self.fs) {
            fs.on_idle()?;
        }
        Ok(())
    }
}

/// Loads the bucket list into the cache ahead of the first root listing
pub(crate) struct ListBucketsTask {
    fs: Weak<FsInner>,
}

impl ListBucketsTask {
    pub(crate) fn new(fs: Weak<FsInner>) -> Self {
        Self { fs }
    }
}

impl OnDemandTask for ListBucketsTask {
    fn name(&self) -> &str {
        "ListBucketsTask"
    }

    fn synonym(&self) -> Option<String> {
        Some("ListBucketsTask".to_string())
    }

    fn run(&mut self, _worker: usize) -> anyhow::Result<()> {
        let Some(fs) = BucketFs::upgrade(&self.fs) else {
            return Ok(());
        };
        let buckets = fs.list_buckets()?;
        tracing::debug!(count = buckets.len(), "prefetched bucket list");
        Ok(())
    }
}
