use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use common::object::MetadataRecord;

use super::engine::{CacheKey, CacheReport, MetadataCache};

/// The one key of the bucket list cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketListKey;

impl fmt::Display for BucketListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("buckets")
    }
}

impl CacheKey for BucketListKey {}

#[derive(Debug, Clone, Serialize)]
pub struct BucketCacheReport {
    pub cache: CacheReport,
    pub regions: BTreeMap<String, String>,
}

/// Every visible bucket, plus a bucket to region side map
#[derive(Debug)]
pub struct BucketListCache {
    list: MetadataCache<BucketListKey, Arc<Vec<MetadataRecord>>>,
    regions: Mutex<HashMap<String, String>>,
}

impl Default for BucketListCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketListCache {
    pub fn new() -> Self {
        Self {
            list: MetadataCache::new("buckets"),
            regions: Mutex::new(HashMap::new()),
        }
    }

    #[track_caller]
    pub fn get(&self) -> Option<Arc<Vec<MetadataRecord>>> {
        self.list.get_positive(&BucketListKey)
    }

    #[track_caller]
    pub fn set(&self, buckets: Vec<MetadataRecord>) -> Arc<Vec<MetadataRecord>> {
        let buckets = Arc::new(buckets);
        self.list.set_positive(BucketListKey, buckets.clone());
        buckets
    }

    #[track_caller]
    pub fn is_negative(&self) -> bool {
        self.list.is_negative(&BucketListKey)
    }

    #[track_caller]
    pub fn add_negative(&self) {
        self.list.add_negative(BucketListKey);
    }

    /// Cached record for `bucket`, if the list is loaded and contains it
    #[track_caller]
    pub fn find(&self, bucket: &str) -> Option<MetadataRecord> {
        self.get()?
            .iter()
            .find(|record| record.name() == bucket)
            .cloned()
    }

    /// Whether a positive list is cached, without counting as a read
    pub fn is_loaded(&self) -> bool {
        self.list.positive_len() > 0
    }

    pub fn region(&self, bucket: &str) -> Option<String> {
        self.regions.lock().get(bucket).cloned()
    }

    pub fn set_region(&self, bucket: &str, region: String) {
        self.regions.lock().insert(bucket.to_string(), region);
    }

    pub fn invalidate(&self) -> usize {
        self.list.invalidate(&BucketListKey)
    }

    pub fn evict_older_than(&self, threshold: DateTime<Utc>) -> usize {
        self.list.evict_older_than(threshold)
    }

    pub fn report(&self) -> BucketCacheReport {
        BucketCacheReport {
            cache: self.list.report(),
            regions: self
                .regions
                .lock()
                .iter()
                .map(|(bucket, region)| (bucket.clone(), region.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_and_regions() {
        let cache = BucketListCache::new();
        assert!(cache.find("photos").is_none());
        assert!(!cache.is_loaded());

        let now = Utc::now();
        cache.set(vec![
            MetadataRecord::bucket("logs", now),
            MetadataRecord::bucket("photos", now),
        ]);
        assert!(cache.is_loaded());
        assert_eq!(cache.find("photos").unwrap().name(), "photos");
        assert!(cache.find("videos").is_none());

        cache.set_region("photos", "ap-northeast-1".to_string());
        assert_eq!(cache.region("photos").as_deref(), Some("ap-northeast-1"));
        assert_eq!(cache.report().regions.len(), 1);
    }

    #[test]
    fn test_negative_replaces_list() {
        let cache = BucketListCache::new();
        cache.set(vec![MetadataRecord::bucket("logs", Utc::now())]);
        cache.add_negative();
        assert!(cache.is_negative());
        assert!(cache.get().is_none());
        assert_eq!(cache.invalidate(), 1);
        assert!(!cache.is_negative());
    }
}
