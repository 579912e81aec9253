use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use common::object::{MetadataRecord, ObjectIdentity};

use super::engine::{CacheCounters, CacheKey, CacheReport, MetadataCache};

/// Which remote question an entry answers
///
/// "does this exist" and "what does this directory contain" are served by
/// different remote calls and are cached separately for the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Purpose {
    HeadFile,
    ListDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectCacheKey {
    pub identity: ObjectIdentity,
    pub purpose: Purpose,
}

impl ObjectCacheKey {
    pub fn new(identity: ObjectIdentity, purpose: Purpose) -> Self {
        Self { identity, purpose }
    }
}

impl fmt::Display for ObjectCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:?}]", self.identity, self.purpose)
    }
}

impl CacheKey for ObjectCacheKey {
    fn parent_keys(&self) -> Vec<Self> {
        match self.identity.parent() {
            Some(parent) => vec![
                Self::new(parent.clone(), Purpose::HeadFile),
                Self::new(parent, Purpose::ListDirectory),
            ],
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CachedObject {
    Head(MetadataRecord),
    Listing(Arc<Vec<MetadataRecord>>),
}

/// Head and listing answers for objects
#[derive(Debug)]
pub struct ObjectCache {
    cache: MetadataCache<ObjectCacheKey, CachedObject>,
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectCache {
    pub fn new() -> Self {
        Self {
            cache: MetadataCache::new("objects"),
        }
    }

    #[track_caller]
    pub fn get_head(&self, identity: &ObjectIdentity) -> Option<MetadataRecord> {
        let key = ObjectCacheKey::new(identity.clone(), Purpose::HeadFile);
        match self.cache.get_positive(&key)? {
            CachedObject::Head(record) => Some(record),
            CachedObject::Listing(_) => None,
        }
    }

    #[track_caller]
    pub fn set_head(&self, identity: &ObjectIdentity, record: MetadataRecord) {
        self.cache.set_positive(
            ObjectCacheKey::new(identity.clone(), Purpose::HeadFile),
            CachedObject::Head(record),
        );
    }

    #[track_caller]
    pub fn get_listing(&self, identity: &ObjectIdentity) -> Option<Arc<Vec<MetadataRecord>>> {
        let key = ObjectCacheKey::new(identity.clone(), Purpose::ListDirectory);
        match self.cache.get_positive(&key)? {
            CachedObject::Listing(records) => Some(records),
            CachedObject::Head(_) => None,
        }
    }

    #[track_caller]
    pub fn set_listing(
        &self,
        identity: &ObjectIdentity,
        records: Vec<MetadataRecord>,
    ) -> Arc<Vec<MetadataRecord>> {
        let records = Arc::new(records);
        self.cache.set_positive(
            ObjectCacheKey::new(identity.clone(), Purpose::ListDirectory),
            CachedObject::Listing(records.clone()),
        );
        records
    }

    #[track_caller]
    pub fn is_negative(&self, identity: &ObjectIdentity, purpose: Purpose) -> bool {
        self.cache
            .is_negative(&ObjectCacheKey::new(identity.clone(), purpose))
    }

    #[track_caller]
    pub fn add_negative(&self, identity: &ObjectIdentity, purpose: Purpose) {
        self.cache
            .add_negative(ObjectCacheKey::new(identity.clone(), purpose));
    }

    /// Forget everything cached about `identity` and its parent directory
    ///
    /// Both the file and directory forms of the name are dropped, since a
    /// remote change may turn one into the other.
    pub fn invalidate(&self, identity: &ObjectIdentity) -> usize {
        let mut forms = vec![identity.to_file_form()];
        if !identity.is_root() && !identity.is_bucket() {
            forms.push(identity.to_directory_form());
        }
        let mut removed = 0;
        for form in forms {
            for purpose in [Purpose::HeadFile, Purpose::ListDirectory] {
                removed += self.cache.invalidate(&ObjectCacheKey::new(form.clone(), purpose));
            }
        }
        if let Some(parent) = identity.parent() {
            removed += self
                .cache
                .invalidate(&ObjectCacheKey::new(parent, Purpose::ListDirectory));
        }
        tracing::debug!(path = %identity, removed, "invalidated object cache");
        removed
    }

    /// Forget every entry inside `bucket`
    pub fn invalidate_bucket(&self, bucket: &str) -> usize {
        self.cache
            .remove_where(|key| key.identity.bucket() == bucket)
    }

    pub fn evict_older_than(&self, threshold: DateTime<Utc>) -> usize {
        self.cache.evict_older_than(threshold)
    }

    pub fn clear(&self) -> usize {
        self.cache.clear()
    }

    pub fn len(&self) -> usize {
        self.cache.positive_len() + self.cache.negative_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> CacheCounters {
        self.cache.counters()
    }

    pub fn report(&self) -> CacheReport {
        self.cache.report()
    }
}
