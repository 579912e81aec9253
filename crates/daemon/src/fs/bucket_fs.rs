use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::RegexSet;
use serde::Serialize;

use common::client::{ClientError, ObjectClient, PutAttributes};
use common::object::{MetadataRecord, ObjectIdentity, SEPARATOR};
use common::sync::NamedLockRegistry;
use common::worker::{DedupPolicy, Enqueued, Priority, Scheduler, TaskQueue};

use crate::cache::{BucketListCache, ObjectCache, Purpose};
use crate::config::{Config, ConfigError};
use crate::download::DownloadOrchestrator;
use crate::local::{
    self, cache_file_path, ensure_parent, remove_cache_file, remove_stale_files, stamp_times,
    touch_accessed, CleanupStats, ReconciliationAction, ReplicaError,
};
use crate::report::{FsReport, LockReport};
use crate::state::AppState;

use super::context::{DirectoryContext, FileContext, OpenContext, OpenMode};
use super::error::{FsError, FsResult};
use super::handles::OpenReplicas;
use super::tasks::{EvictCachesTask, IdleTask, ListBucketsTask};

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to prepare {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },
    #[error("failed to start worker threads: {0}")]
    Workers(#[source] io::Error),
}

/// Entries removed by one eviction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvictionStats {
    pub buckets: usize,
    pub objects: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdleStats {
    pub cleanup: CleanupStats,
    /// Whether a bucket list prefetch was queued
    pub prefetch_queued: bool,
}

#[derive(Debug)]
pub(crate) struct FsInner {
    config: Config,
    client: Arc<dyn ObjectClient>,
    buckets: BucketListCache,
    objects: ObjectCache,
    /// Creation of local cache files
    create_locks: NamedLockRegistry,
    /// Reconciliation, download, writes and removal of local cache files,
    /// keyed by cache file path
    sync_locks: NamedLockRegistry,
    /// Object creation and upload on the remote
    remote_locks: NamedLockRegistry,
    open_replicas: Arc<OpenReplicas>,
    queue: Arc<TaskQueue>,
    downloader: DownloadOrchestrator,
    cache_dir: PathBuf,
    report_dir: PathBuf,
    ignore: Option<RegexSet>,
    mounted_at: DateTime<Utc>,
    scheduler: Mutex<Option<Scheduler>>,
}

/// Filesystem view over the buckets reachable through an [`ObjectClient`]
///
/// Cheap to clone; every clone shares caches, locks and worker pools.
#[derive(Debug, Clone)]
pub struct BucketFs {
    inner: Arc<FsInner>,
}

fn prepare_dir(path: &Path) -> Result<(), MountError> {
    std::fs::create_dir_all(path).map_err(|source| MountError::Directory {
        path: path.to_path_buf(),
        source,
    })
}

fn lock_key(identity: &ObjectIdentity) -> String {
    identity.to_file_form().to_string()
}

fn replica_key(local_path: &Path) -> String {
    local_path.to_string_lossy().into_owned()
}

impl BucketFs {
    pub fn mount(
        client: Arc<dyn ObjectClient>,
        config: Config,
        cache_dir: impl Into<PathBuf>,
        report_dir: impl Into<PathBuf>,
    ) -> Result<Self, MountError> {
        let mut config = config;
        config.clamp();
        let cache_dir = cache_dir.into();
        let report_dir = report_dir.into();
        prepare_dir(&cache_dir)?;
        prepare_dir(&report_dir)?;

        let ignore = config.ignore_set()?;
        let queue = Arc::new(
            TaskQueue::start("bucketfs-delayed", config.delayed_workers)
                .map_err(MountError::Workers)?,
        );
        let downloader = DownloadOrchestrator::new(client.clone(), queue.clone(), config.part_size());

        tracing::info!(
            cache_dir = %cache_dir.display(),
            readonly = config.readonly,
            part_size = config.part_size(),
            workers = config.delayed_workers,
            "mounted"
        );

        Ok(Self {
            inner: Arc::new(FsInner {
                config,
                client,
                buckets: BucketListCache::new(),
                objects: ObjectCache::new(),
                create_locks: NamedLockRegistry::new("cache-file-create"),
                sync_locks: NamedLockRegistry::new("cache-file-sync"),
                remote_locks: NamedLockRegistry::new("remote-create"),
                open_replicas: Arc::new(OpenReplicas::default()),
                queue,
                downloader,
                cache_dir,
                report_dir,
                ignore,
                mounted_at: Utc::now(),
                scheduler: Mutex::new(None),
            }),
        })
    }

    /// Mount with the layout and configuration of an initialized work directory
    pub fn from_state(state: &AppState, client: Arc<dyn ObjectClient>) -> Result<Self, MountError> {
        Self::mount(
            client,
            state.config.clone(),
            state.cache_dir.clone(),
            state.report_dir.clone(),
        )
    }

    pub(crate) fn upgrade(weak: &Weak<FsInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    /// Local replica location for `identity`
    pub fn cache_path(&self, identity: &ObjectIdentity) -> PathBuf {
        cache_file_path(&self.inner.cache_dir, &identity.to_file_form())
    }

    pub fn bucket_cache(&self) -> &BucketListCache {
        &self.inner.buckets
    }

    pub fn object_cache(&self) -> &ObjectCache {
        &self.inner.objects
    }

    /// Run eviction every tick and idle maintenance every Nth tick
    pub fn start_maintenance(&self) -> Result<(), MountError> {
        let mut slot = self.inner.scheduler.lock();
        if slot.is_some() {
            return Ok(());
        }
        let config = &self.inner.config;
        let scheduler = Scheduler::start(
            "bucketfs-scheduled",
            config.tick_period(),
            config.scheduled_workers,
        )
        .map_err(MountError::Workers)?;
        let weak = Arc::downgrade(&self.inner);
        scheduler.register(Arc::new(EvictCachesTask::new(weak.clone())));
        scheduler.register(Arc::new(IdleTask::new(weak, config.idle_every_ticks)));
        *slot = Some(scheduler);
        Ok(())
    }

    /// Stop the scheduler and the delayed worker pool
    pub fn unmount(&self) {
        if let Some(mut scheduler) = self.inner.scheduler.lock().take() {
            scheduler.stop();
        }
        self.inner.queue.stop();
        tracing::info!("unmounted");
    }

    fn is_ignored(&self, identity: &ObjectIdentity) -> bool {
        match &self.inner.ignore {
            Some(set) => set.is_match(&identity.to_file_form().to_string()),
            None => false,
        }
    }

    fn present(&self, record: MetadataRecord) -> MetadataRecord {
        record.with_readonly(self.inner.config.readonly)
    }

    fn ensure_writable(&self) -> FsResult<()> {
        if self.inner.config.readonly {
            return Err(FsError::ReadOnly);
        }
        Ok(())
    }

    fn listing_limit(&self) -> Option<usize> {
        match self.inner.config.max_display_objects {
            0 => None,
            n => Some(n),
        }
    }

    // buckets

    /// Every visible bucket, from the cache when it is fresh
    pub fn list_buckets(&self) -> FsResult<Arc<Vec<MetadataRecord>>> {
        let cache = &self.inner.buckets;
        if let Some(buckets) = cache.get() {
            return Ok(buckets);
        }
        if cache.is_negative() {
            return Ok(Arc::new(Vec::new()));
        }

        match self.inner.client.list_buckets() {
            Ok(buckets) if buckets.is_empty() => {
                cache.add_negative();
                Ok(Arc::new(Vec::new()))
            }
            Ok(buckets) => {
                tracing::debug!(count = buckets.len(), "loaded bucket list");
                Ok(cache.set(buckets))
            }
            Err(ClientError::NotFound(_)) => {
                cache.add_negative();
                Ok(Arc::new(Vec::new()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn bucket_record(&self, bucket: &str) -> FsResult<MetadataRecord> {
        let record = self
            .list_buckets()?
            .iter()
            .find(|record| record.name() == bucket)
            .cloned()
            .ok_or_else(|| FsError::NotFound(format!("{SEPARATOR}{bucket}")))?;

        if self.inner.buckets.region(bucket).is_none() {
            match self.inner.client.bucket_region(bucket) {
                Ok(region) => {
                    tracing::debug!(bucket, region = %region, "resolved bucket region");
                    self.inner.buckets.set_region(bucket, region);
                }
                Err(e) => tracing::warn!(bucket, error = %e, "bucket region lookup failed"),
            }
        }
        Ok(record)
    }

    // metadata

    pub fn stat_path(&self, path: &str) -> FsResult<MetadataRecord> {
        self.stat(&ObjectIdentity::parse_namespace_path(path)?)
    }

    /// Metadata for a path; a file-form name that is not a file is tried
    /// again as a directory
    pub fn stat(&self, identity: &ObjectIdentity) -> FsResult<MetadataRecord> {
        let identity = identity.resolve_dot_entry();
        if self.is_ignored(&identity) {
            return Err(FsError::NotFound(identity.to_string()));
        }
        if identity.is_root() {
            return Ok(self.present(MetadataRecord::root(self.inner.mounted_at)));
        }
        if identity.is_bucket() {
            return self.bucket_record(identity.bucket()).map(|r| self.present(r));
        }

        if identity.is_file() {
            if let Some(record) = self.head_file(&identity)? {
                return Ok(self.present(record));
            }
        }
        self.head_directory(&identity.to_directory_form())?
            .map(|record| self.present(record))
            .ok_or_else(|| FsError::NotFound(identity.to_string()))
    }

    fn head_file(&self, identity: &ObjectIdentity) -> FsResult<Option<MetadataRecord>> {
        let objects = &self.inner.objects;
        if let Some(record) = objects.get_head(identity) {
            return Ok(Some(record));
        }
        if objects.is_negative(identity, Purpose::HeadFile) {
            return Ok(None);
        }
        match self.bucket_record(identity.bucket()) {
            Ok(_) => {}
            Err(FsError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        }

        match self.inner.client.head_object(identity) {
            Ok(Some(record)) => {
                objects.set_head(identity, record.clone());
                Ok(Some(record))
            }
            Ok(None) | Err(ClientError::NotFound(_)) => {
                objects.add_negative(identity, Purpose::HeadFile);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Directory existence, answered from the parent listing
    fn head_directory(&self, dir: &ObjectIdentity) -> FsResult<Option<MetadataRecord>> {
        let objects = &self.inner.objects;
        if let Some(record) = objects.get_head(dir) {
            return Ok(Some(record));
        }
        if objects.is_negative(dir, Purpose::HeadFile) {
            return Ok(None);
        }
        let Some(parent) = dir.parent() else {
            return Ok(None);
        };

        let listing = match self.listing(&parent) {
            Ok(listing) => listing,
            Err(FsError::NotFound(_)) => {
                objects.add_negative(dir, Purpose::HeadFile);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let found = listing
            .iter()
            .find(|record| record.is_directory() && record.name() == dir.name())
            .cloned();
        let found = match found {
            Some(record) => Some(record),
            // the parent listing was cut short; ask about this prefix directly
            None if self.listing_limit().is_some_and(|limit| listing.len() >= limit) => {
                let children = self.inner.client.list_objects(dir, Some(SEPARATOR), Some(1))?;
                (!children.is_empty()).then(|| MetadataRecord::directory(dir, Utc::now()))
            }
            None => None,
        };

        match &found {
            Some(record) => objects.set_head(dir, record.clone()),
            None => objects.add_negative(dir, Purpose::HeadFile),
        }
        Ok(found)
    }

    fn child_identity(dir: &ObjectIdentity, record: &MetadataRecord) -> ObjectIdentity {
        if record.is_directory() {
            dir.append(&format!("{}{SEPARATOR}", record.name()))
        } else {
            dir.append(record.name())
        }
    }

    /// Children of a directory identity, cached as a ListDirectory entry
    fn listing(&self, dir: &ObjectIdentity) -> FsResult<Arc<Vec<MetadataRecord>>> {
        let objects = &self.inner.objects;
        if let Some(listing) = objects.get_listing(dir) {
            return Ok(listing);
        }
        if objects.is_negative(dir, Purpose::ListDirectory) {
            return Err(FsError::NotFound(dir.to_string()));
        }
        self.bucket_record(dir.bucket())?;

        let records = match self
            .inner
            .client
            .list_objects(dir, Some(SEPARATOR), self.listing_limit())
        {
            Ok(records) => records,
            Err(ClientError::NotFound(_)) => {
                objects.add_negative(dir, Purpose::ListDirectory);
                return Err(FsError::NotFound(dir.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        // an empty prefix only exists if it has a marker object
        if records.is_empty() && !dir.is_bucket() {
            match self.inner.client.head_object(dir) {
                Ok(Some(_)) => {}
                Ok(None) | Err(ClientError::NotFound(_)) => {
                    objects.add_negative(dir, Purpose::ListDirectory);
                    return Err(FsError::NotFound(dir.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let directories: HashSet<String> = records
            .iter()
            .filter(|record| record.is_directory())
            .map(|record| record.name().to_string())
            .collect();
        let records: Vec<MetadataRecord> = records
            .into_iter()
            .filter(|record| !record.name().is_empty())
            .filter(|record| record.is_directory() || !directories.contains(record.name()))
            .filter(|record| !self.is_ignored(&Self::child_identity(dir, record)))
            .collect();

        // listed file times may differ from what a head reports
        let prime_files = self.inner.client.listings_carry_put_times();
        for record in records.iter().filter(|r| r.is_directory() || prime_files) {
            objects.set_head(&Self::child_identity(dir, record), record.clone());
        }
        tracing::debug!(path = %dir, entries = records.len(), "listed directory");
        Ok(objects.set_listing(dir, records))
    }

    /// Entries of a directory; the root lists buckets
    pub fn list_directory(&self, identity: &ObjectIdentity) -> FsResult<Vec<MetadataRecord>> {
        let identity = identity.resolve_dot_entry();
        if self.is_ignored(&identity) {
            return Err(FsError::NotFound(identity.to_string()));
        }

        if identity.is_root() {
            let limit = match self.inner.config.max_display_buckets {
                0 => usize::MAX,
                n => n,
            };
            return Ok(self
                .list_buckets()?
                .iter()
                .filter(|record| !self.is_ignored(&ObjectIdentity::bucket_root(record.name())))
                .take(limit)
                .map(|record| self.present(record.clone()))
                .collect());
        }

        if identity.is_file() && self.head_file(&identity)?.is_some() {
            return Err(FsError::NotADirectory(identity.to_string()));
        }
        let listing = self.listing(&identity.to_directory_form())?;
        Ok(listing
            .iter()
            .map(|record| self.present(record.clone()))
            .collect())
    }

    // file content

    pub fn open_for_read(&self, identity: &ObjectIdentity) -> FsResult<OpenContext> {
        self.open(identity, OpenMode::Read)
    }

    pub fn open_for_write(&self, identity: &ObjectIdentity) -> FsResult<OpenContext> {
        self.open(identity, OpenMode::Write)
    }

    /// Open a path; files are reconciled with the remote before returning
    pub fn open(&self, identity: &ObjectIdentity, mode: OpenMode) -> FsResult<OpenContext> {
        if mode == OpenMode::Write {
            self.ensure_writable()?;
        }
        let identity = identity.resolve_dot_entry();
        let record = self.stat(&identity)?;

        if identity.is_root() {
            return Ok(OpenContext::Root);
        }
        if record.is_directory() {
            if mode == OpenMode::Write {
                return Err(FsError::IsADirectory(identity.to_string()));
            }
            let context = DirectoryContext {
                identity: identity.to_directory_form(),
                record,
            };
            return Ok(if identity.is_bucket() {
                OpenContext::Bucket(context)
            } else {
                OpenContext::Directory(context)
            });
        }

        self.open_file(&identity.to_file_form(), record, mode)
            .map(OpenContext::File)
    }

    fn open_file(
        &self,
        identity: &ObjectIdentity,
        record: MetadataRecord,
        mode: OpenMode,
    ) -> FsResult<FileContext> {
        let local_path = cache_file_path(&self.inner.cache_dir, identity);
        {
            let _create = self.inner.create_locks.acquire(&lock_key(identity));
            ensure_parent(&local_path)?;
        }

        let _sync = self.inner.sync_locks.acquire(&replica_key(&local_path));
        let file = self.sync_replica(identity, &record, &local_path)?;
        let handle = self.inner.open_replicas.register(&local_path);

        Ok(FileContext {
            identity: identity.clone(),
            record,
            local_path,
            file,
            writable: mode == OpenMode::Write,
            handle,
        })
    }

    /// Bring the local replica in line with `remote`; the caller holds the
    /// sync lock for `local_path`
    ///
    /// A replica with writes still waiting for upload is newer than the
    /// remote and is used as it is.
    fn sync_replica(
        &self,
        identity: &ObjectIdentity,
        remote: &MetadataRecord,
        local_path: &Path,
    ) -> FsResult<File> {
        if self.inner.open_replicas.has_unsent_writes(local_path) {
            tracing::debug!(path = %identity, "replica has unsent writes, skipping reconciliation");
            return Ok(OpenOptions::new().read(true).write(true).open(local_path)?);
        }

        let action = local::reconcile(remote, local_path)?;
        let file = local::apply(action, remote, local_path)?;

        if action == ReconciliationAction::Download {
            if let Err(e) = self.inner.downloader.download(identity, remote, local_path) {
                tracing::warn!(path = %identity, error = %e, "download failed, dropping local replica");
                drop(file);
                remove_cache_file(local_path)?;
                return Err(e.into());
            }
        }

        match local::verify_size(&file, remote.size()) {
            Ok(()) => Ok(file),
            Err(ReplicaError::SizeMismatch { expected, actual }) => {
                tracing::warn!(path = %identity, expected, actual, "local replica size mismatch");
                drop(file);
                remove_cache_file(local_path)?;
                Err(FsError::SizeMismatch {
                    path: identity.to_string(),
                    expected,
                    actual,
                })
            }
            Err(ReplicaError::Io(e)) => Err(e.into()),
        }
    }

    /// Read into `buf` from `offset`; returns the number of bytes read
    pub fn read(&self, context: &OpenContext, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let Some(ctx) = context.as_file() else {
            return Err(FsError::IsADirectory(context.identity().to_string()));
        };
        let mut file = &ctx.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let _sync = self.inner.sync_locks.acquire(&replica_key(&ctx.local_path));
        touch_accessed(&ctx.file)?;
        Ok(filled)
    }

    /// Write `data` at `offset` in the local replica; uploaded on close
    pub fn write(&self, context: &mut OpenContext, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.ensure_writable()?;
        let identity = context.identity();
        let Some(ctx) = context.as_file_mut() else {
            return Err(FsError::IsADirectory(identity.to_string()));
        };
        if !ctx.writable {
            return Err(FsError::BadHandle("writing"));
        }
        let _sync = self.inner.sync_locks.acquire(&replica_key(&ctx.local_path));
        let mut file = &ctx.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        ctx.handle.mark_dirty();
        touch_accessed(&ctx.file)?;
        Ok(data.len())
    }

    /// Release a handle, uploading the replica if it was written to
    pub fn close(&self, context: OpenContext) -> FsResult<()> {
        let OpenContext::File(ctx) = context else {
            return Ok(());
        };
        if !ctx.is_dirty() {
            return Ok(());
        }
        self.upload(ctx)
    }

    fn upload(&self, mut ctx: FileContext) -> FsResult<()> {
        let _remote = self.inner.remote_locks.acquire(&lock_key(&ctx.identity));
        let _sync = self.inner.sync_locks.acquire(&replica_key(&ctx.local_path));
        ctx.file.sync_all()?;

        let written_at = Utc::now();
        let attrs = PutAttributes {
            creation_time: Some(ctx.record.creation_time()),
            last_write_time: Some(written_at),
        };
        self.inner
            .client
            .put_object(&ctx.identity, Some(&ctx.local_path), &attrs)?;
        stamp_times(&ctx.file, ctx.record.creation_time(), written_at)?;
        ctx.handle.mark_clean();
        self.inner.objects.invalidate(&ctx.identity);

        tracing::debug!(
            path = %ctx.identity,
            size = ctx.file.metadata()?.len(),
            "uploaded local replica"
        );

        if self.inner.config.delete_after_upload {
            if self.inner.open_replicas.handles(&ctx.local_path) > 1 {
                tracing::debug!(path = %ctx.identity, "replica still open elsewhere, kept");
            } else {
                drop(ctx.file);
                remove_cache_file(&ctx.local_path)?;
            }
        }
        Ok(())
    }

    // namespace mutation

    /// Create an empty file, or a directory marker when `directory` is set
    pub fn create_empty(&self, identity: &ObjectIdentity, directory: bool) -> FsResult<MetadataRecord> {
        self.ensure_writable()?;
        let identity = identity.resolve_dot_entry();
        if identity.is_root() || identity.is_bucket() {
            return Err(FsError::NotSupported(format!("cannot create {identity}")));
        }
        if self.is_ignored(&identity) {
            return Err(FsError::NotSupported(format!("{identity} is ignored")));
        }

        let target = if directory {
            identity.to_directory_form()
        } else {
            identity.to_file_form()
        };
        let _remote = self.inner.remote_locks.acquire(&lock_key(&target));

        match self.stat(&identity) {
            Ok(_) => return Err(FsError::AlreadyExists(identity.to_string())),
            Err(FsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        if let Some(parent) = target.parent() {
            if !self.stat(&parent)?.is_directory() {
                return Err(FsError::NotADirectory(parent.to_string()));
            }
        }

        let now = Utc::now();
        let attrs = PutAttributes {
            creation_time: Some(now),
            last_write_time: Some(now),
        };
        self.inner.client.put_object(&target, None, &attrs)?;
        self.inner.objects.invalidate(&target);

        let record = if directory {
            MetadataRecord::directory(&target, now)
        } else {
            let local_path = cache_file_path(&self.inner.cache_dir, &target);
            let _sync = self.inner.sync_locks.acquire(&replica_key(&local_path));
            let _create = self.inner.create_locks.acquire(&lock_key(&target));
            ensure_parent(&local_path)?;
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&local_path)?;
            stamp_times(&file, now, now)?;
            MetadataRecord::file(&target, 0, now, now)
        };

        tracing::debug!(path = %target, directory, "created");
        Ok(self.present(record))
    }

    /// Delete a file, or an empty directory
    pub fn remove(&self, identity: &ObjectIdentity) -> FsResult<()> {
        self.ensure_writable()?;
        let identity = identity.resolve_dot_entry();
        if identity.is_root() || identity.is_bucket() {
            return Err(FsError::NotSupported(format!("cannot remove {identity}")));
        }
        let record = self.stat(&identity)?;

        if record.is_file() {
            let target = identity.to_file_form();
            let key = lock_key(&target);
            let _remote = self.inner.remote_locks.acquire(&key);
            if let Err(e) = self.inner.client.delete_object(&target) {
                if e.is_not_found() {
                    self.inner.objects.invalidate(&target);
                }
                return Err(e.into());
            }
            {
                let local_path = cache_file_path(&self.inner.cache_dir, &target);
                let _sync = self.inner.sync_locks.acquire(&replica_key(&local_path));
                remove_cache_file(&local_path)?;
            }
            self.inner.objects.invalidate(&target);
            tracing::debug!(path = %target, "removed file");
            return Ok(());
        }

        let dir = identity.to_directory_form();
        let _remote = self.inner.remote_locks.acquire(&lock_key(&dir));
        let children = self.inner.client.list_objects(&dir, Some(SEPARATOR), Some(1))?;
        if !children.is_empty() {
            return Err(FsError::DirectoryNotEmpty(dir.to_string()));
        }
        match self.inner.client.delete_object(&dir) {
            Ok(()) | Err(ClientError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.inner.objects.invalidate(&dir);
        tracing::debug!(path = %dir, "removed directory");
        Ok(())
    }

    /// Move a file: the replica is synced, uploaded under the new name, and
    /// the old object deleted
    pub fn rename(&self, from: &ObjectIdentity, to: &ObjectIdentity) -> FsResult<()> {
        self.ensure_writable()?;
        let from = from.resolve_dot_entry();
        let to = to.resolve_dot_entry();
        for identity in [&from, &to] {
            if identity.is_root() || identity.is_bucket() {
                return Err(FsError::NotSupported(format!("cannot rename {identity}")));
            }
        }
        if self.is_ignored(&to) {
            return Err(FsError::NotSupported(format!("{to} is ignored")));
        }

        let record = self.stat(&from)?;
        if record.is_directory() {
            return Err(FsError::NotSupported(format!(
                "directory rename: {from}"
            )));
        }
        let from = from.to_file_form();
        let to = to.to_file_form();
        if from == to {
            return Ok(());
        }
        match self.stat(&to) {
            Ok(existing) if existing.is_directory() => {
                return Err(FsError::AlreadyExists(to.to_string()));
            }
            Ok(_) | Err(FsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        if let Some(parent) = to.parent() {
            if !self.stat(&parent)?.is_directory() {
                return Err(FsError::NotADirectory(parent.to_string()));
            }
        }

        let (from_key, to_key) = (lock_key(&from), lock_key(&to));
        let from_path = cache_file_path(&self.inner.cache_dir, &from);
        let to_path = cache_file_path(&self.inner.cache_dir, &to);

        // both names, always in the same order
        let (first, second) = if from_key < to_key {
            (&from_key, &to_key)
        } else {
            (&to_key, &from_key)
        };
        let _remote_first = self.inner.remote_locks.acquire(first);
        let _remote_second = self.inner.remote_locks.acquire(second);
        let mut replica_keys = [replica_key(&from_path), replica_key(&to_path)];
        replica_keys.sort();
        let _sync_first = self.inner.sync_locks.acquire(&replica_keys[0]);
        let _sync_second = self.inner.sync_locks.acquire(&replica_keys[1]);

        {
            let _create = self.inner.create_locks.acquire(&from_key);
            ensure_parent(&from_path)?;
        }
        let file = self.sync_replica(&from, &record, &from_path)?;
        drop(file);

        let attrs = PutAttributes {
            creation_time: Some(record.creation_time()),
            last_write_time: Some(record.last_write_time()),
        };
        self.inner.client.put_object(&to, Some(&from_path), &attrs)?;
        match self.inner.client.delete_object(&from) {
            Ok(()) | Err(ClientError::NotFound(_)) => {}
            Err(e) => {
                self.inner.objects.invalidate(&to);
                return Err(e.into());
            }
        }

        {
            let _create = self.inner.create_locks.acquire(&to_key);
            ensure_parent(&to_path)?;
            std::fs::rename(&from_path, &to_path)?;
        }
        self.inner.objects.invalidate(&from);
        self.inner.objects.invalidate(&to);
        tracing::debug!(from = %from, to = %to, "renamed");
        Ok(())
    }

    /// Drop cached answers for `identity`; the root drops everything
    pub fn invalidate_cache(&self, identity: &ObjectIdentity) -> usize {
        let identity = identity.resolve_dot_entry();
        if identity.is_root() {
            return self.inner.buckets.invalidate() + self.inner.objects.clear();
        }
        if identity.is_bucket() {
            return self.inner.objects.invalidate_bucket(identity.bucket());
        }
        self.inner.objects.invalidate(&identity)
    }

    // maintenance

    /// Evict cache entries older than their TTL
    pub fn on_tick(&self) -> EvictionStats {
        let now = Utc::now();
        let config = &self.inner.config;
        let stats = EvictionStats {
            buckets: self
                .inner
                .buckets
                .evict_older_than(now - config.bucket_cache_ttl()),
            objects: self
                .inner
                .objects
                .evict_older_than(now - config.object_cache_ttl()),
        };
        if stats.buckets + stats.objects > 0 {
            tracing::debug!(buckets = stats.buckets, objects = stats.objects, "evicted cache entries");
        }
        stats
    }

    /// Delete stale local cache files and prefetch the bucket list if needed
    pub fn on_idle(&self) -> FsResult<IdleStats> {
        let inner = &self.inner;
        let cleanup = remove_stale_files(
            &inner.cache_dir,
            inner.config.cache_file_retention(),
            |path| {
                let guard = inner.sync_locks.acquire(&replica_key(path));
                (!inner.open_replicas.is_open(path)).then_some(guard)
            },
        )?;

        let mut prefetch_queued = false;
        if !self.inner.buckets.is_loaded() {
            let task = ListBucketsTask::new(Arc::downgrade(&self.inner));
            prefetch_queued = self.inner.queue.add_task(
                Box::new(task),
                Priority::Low,
                DedupPolicy::SkipIfPending,
            ) == Enqueued::Queued;
        }

        tracing::debug!(
            scanned = cleanup.scanned,
            removed = cleanup.removed,
            in_use = cleanup.in_use,
            failed = cleanup.failed,
            prefetch_queued,
            "idle maintenance"
        );
        Ok(IdleStats {
            cleanup,
            prefetch_queued,
        })
    }

    pub fn report(&self) -> FsReport {
        let inner = &self.inner;
        FsReport {
            generated_at: Utc::now(),
            mounted_at: inner.mounted_at,
            readonly: inner.config.readonly,
            buckets: inner.buckets.report(),
            objects: inner.objects.report(),
            locks: [&inner.create_locks, &inner.sync_locks, &inner.remote_locks]
                .into_iter()
                .map(LockReport::snapshot)
                .collect(),
            task_queue: inner.queue.stats(),
            scheduler_ticks: inner.scheduler.lock().as_ref().map(Scheduler::ticks),
            open_replicas: inner.open_replicas.len(),
        }
    }

    /// Write [`BucketFs::report`] as JSON into the report directory
    pub fn write_report(&self) -> FsResult<PathBuf> {
        let path = self.report().write_to(&self.inner.report_dir)?;
        tracing::info!(path = %path.display(), "wrote report");
        Ok(path)
    }
}
