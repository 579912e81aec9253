//! In-memory object client
//!
//! Keeps buckets and objects in a `BTreeMap` and counts every call, so tests
//! can assert how often the remote was actually consulted. An offline switch
//! turns every call into a transient failure, and single ranged reads can be
//! made to fail on their own.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::{ClientError, ObjectClient, ObjectReader, PutAttributes};
use crate::object::{MetadataRecord, ObjectIdentity, SEPARATOR};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

#[derive(Debug)]
struct MemoryBucket {
    region: String,
    created: DateTime<Utc>,
    objects: BTreeMap<String, MemoryObject>,
}

#[derive(Debug, Default)]
struct CallCounters {
    list_buckets: AtomicU64,
    bucket_region: AtomicU64,
    head_object: AtomicU64,
    list_objects: AtomicU64,
    get_object_range: AtomicU64,
    put_object: AtomicU64,
    delete_object: AtomicU64,
}

/// Snapshot of how many times each remote call was made
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientCallCounts {
    pub list_buckets: u64,
    pub bucket_region: u64,
    pub head_object: u64,
    pub list_objects: u64,
    pub get_object_range: u64,
    pub put_object: u64,
    pub delete_object: u64,
}

#[derive(Debug, Default)]
pub struct MemoryClient {
    buckets: Mutex<BTreeMap<String, MemoryBucket>>,
    calls: CallCounters,
    offline: AtomicBool,
    failing_range: Mutex<Option<u64>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bucket(&self, name: &str, region: &str) {
        self.buckets.lock().insert(
            name.to_string(),
            MemoryBucket {
                region: region.to_string(),
                created: Utc::now(),
                objects: BTreeMap::new(),
            },
        );
    }

    /// Store an object, creating the bucket if needed
    pub fn put_bytes(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.put_bytes_at(bucket, key, data, Utc::now());
    }

    pub fn put_bytes_at(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        modified: DateTime<Utc>,
    ) {
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(bucket.to_string())
            .or_insert_with(|| MemoryBucket {
                region: "us-east-1".to_string(),
                created: modified,
                objects: BTreeMap::new(),
            });
        bucket.objects.insert(
            key.to_string(),
            MemoryObject {
                data: data.into(),
                created: modified,
                modified,
            },
        );
    }

    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.buckets
            .lock()
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.data.clone())
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.object_bytes(bucket, key).is_some()
    }

    /// While offline every call fails with [`ClientError::Transient`]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Ranged reads starting at `offset` fail with [`ClientError::Transient`]
    /// until this is reset with `None`
    pub fn fail_ranges_at(&self, offset: Option<u64>) {
        *self.failing_range.lock() = offset;
    }

    pub fn calls(&self) -> ClientCallCounts {
        let c = &self.calls;
        ClientCallCounts {
            list_buckets: c.list_buckets.load(Ordering::SeqCst),
            bucket_region: c.bucket_region.load(Ordering::SeqCst),
            head_object: c.head_object.load(Ordering::SeqCst),
            list_objects: c.list_objects.load(Ordering::SeqCst),
            get_object_range: c.get_object_range.load(Ordering::SeqCst),
            put_object: c.put_object.load(Ordering::SeqCst),
            delete_object: c.delete_object.load(Ordering::SeqCst),
        }
    }

    fn enter(&self, counter: &AtomicU64) -> Result<(), ClientError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ClientError::Transient("client is offline".to_string()));
        }
        Ok(())
    }

    fn record(identity: &ObjectIdentity, object: &MemoryObject) -> MetadataRecord {
        if identity.is_directory() {
            MetadataRecord::directory(identity, object.modified)
        } else {
            MetadataRecord::file(
                identity,
                object.data.len() as u64,
                object.created,
                object.modified,
            )
        }
    }
}

impl ObjectClient for MemoryClient {
    fn list_buckets(&self) -> Result<Vec<MetadataRecord>, ClientError> {
        self.enter(&self.calls.list_buckets)?;
        Ok(self
            .buckets
            .lock()
            .iter()
            .map(|(name, bucket)| MetadataRecord::bucket(name, bucket.created))
            .collect())
    }

    fn bucket_region(&self, bucket: &str) -> Result<String, ClientError> {
        self.enter(&self.calls.bucket_region)?;
        self.buckets
            .lock()
            .get(bucket)
            .map(|b| b.region.clone())
            .ok_or_else(|| ClientError::NotFound(bucket.to_string()))
    }

    fn head_object(
        &self,
        identity: &ObjectIdentity,
    ) -> Result<Option<MetadataRecord>, ClientError> {
        self.enter(&self.calls.head_object)?;
        if identity.is_root() {
            return Err(ClientError::Fatal("the root is not an object".to_string()));
        }
        let buckets = self.buckets.lock();
        let Some(bucket) = buckets.get(identity.bucket()) else {
            return Ok(None);
        };
        if identity.is_bucket() {
            return Ok(Some(MetadataRecord::bucket(
                identity.bucket(),
                bucket.created,
            )));
        }
        Ok(bucket
            .objects
            .get(identity.key())
            .map(|object| Self::record(identity, object)))
    }

    fn list_objects(
        &self,
        identity: &ObjectIdentity,
        delimiter: Option<char>,
        limit: Option<usize>,
    ) -> Result<Vec<MetadataRecord>, ClientError> {
        self.enter(&self.calls.list_objects)?;
        if !identity.is_directory() || identity.is_root() {
            return Err(ClientError::Fatal(format!(
                "not a listable prefix: {identity}"
            )));
        }
        let buckets = self.buckets.lock();
        let bucket = buckets
            .get(identity.bucket())
            .ok_or_else(|| ClientError::NotFound(identity.bucket().to_string()))?;

        let prefix = identity.key();
        let mut directories: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        let mut files = Vec::new();

        for (key, object) in bucket.objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            if rest.is_empty() {
                continue;
            }
            match delimiter.and_then(|d| rest.find(d)) {
                Some(pos) => {
                    let name = &rest[..pos];
                    directories
                        .entry(name.to_string())
                        .and_modify(|t| *t = (*t).min(object.modified))
                        .or_insert(object.modified);
                }
                None => files.push((rest.to_string(), object)),
            }
        }

        let directory_names: BTreeSet<&str> = directories.keys().map(String::as_str).collect();
        let mut records: Vec<MetadataRecord> = directories
            .iter()
            .map(|(name, modified)| {
                let child = ObjectIdentity::new(
                    identity.bucket(),
                    format!("{prefix}{name}{SEPARATOR}"),
                );
                MetadataRecord::directory(&child, *modified)
            })
            .collect();

        for (rest, object) in files {
            if directory_names.contains(rest.as_str()) {
                continue;
            }
            let child = ObjectIdentity::new(identity.bucket(), format!("{prefix}{rest}"));
            records.push(Self::record(&child, object));
        }

        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    fn get_object_range(
        &self,
        identity: &ObjectIdentity,
        offset: u64,
        length: u64,
    ) -> Result<ObjectReader, ClientError> {
        self.enter(&self.calls.get_object_range)?;
        if *self.failing_range.lock() == Some(offset) {
            return Err(ClientError::Transient(format!(
                "read of {identity} at {offset} refused"
            )));
        }
        let buckets = self.buckets.lock();
        let object = buckets
            .get(identity.bucket())
            .and_then(|b| b.objects.get(identity.key()))
            .ok_or_else(|| ClientError::NotFound(identity.to_string()))?;

        let size = object.data.len() as u64;
        if offset > size {
            return Err(ClientError::Fatal(format!(
                "range start {offset} beyond object size {size}"
            )));
        }
        let end = offset.saturating_add(length).min(size);
        let slice = object.data.slice(offset as usize..end as usize);
        Ok(Box::new(Cursor::new(slice)))
    }

    fn put_object(
        &self,
        identity: &ObjectIdentity,
        source: Option<&Path>,
        attrs: &PutAttributes,
    ) -> Result<(), ClientError> {
        self.enter(&self.calls.put_object)?;
        if identity.is_root() || identity.is_bucket() {
            return Err(ClientError::Fatal(format!("cannot put {identity}")));
        }
        let data = match source {
            Some(path) => Bytes::from(std::fs::read(path).map_err(|e| {
                ClientError::Fatal(format!("reading {}: {e}", path.display()))
            })?),
            None => Bytes::new(),
        };

        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .get_mut(identity.bucket())
            .ok_or_else(|| ClientError::NotFound(identity.bucket().to_string()))?;

        let now = Utc::now();
        let previous_created = bucket.objects.get(identity.key()).map(|o| o.created);
        bucket.objects.insert(
            identity.key().to_string(),
            MemoryObject {
                data,
                created: attrs.creation_time.or(previous_created).unwrap_or(now),
                modified: attrs.last_write_time.unwrap_or(now),
            },
        );
        Ok(())
    }

    fn delete_object(&self, identity: &ObjectIdentity) -> Result<(), ClientError> {
        self.enter(&self.calls.delete_object)?;
        let mut buckets = self.buckets.lock();
        buckets
            .get_mut(identity.bucket())
            .and_then(|b| b.objects.remove(identity.key()))
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(identity.to_string()))
    }
}
