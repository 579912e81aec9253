//! Metadata caches
//!
//! [`BucketListCache`] holds the single list of buckets shown at the root;
//! [`ObjectCache`] holds head and listing answers keyed by path and purpose.
//! Both are instances of the generic [`MetadataCache`].

mod bucket_cache;
mod engine;
mod entry;
mod object_cache;

pub use bucket_cache::{BucketCacheReport, BucketListCache, BucketListKey};
pub use engine::{CacheCounters, CacheKey, CacheReport, EntryReport, MetadataCache};
pub use entry::{CacheEntry, CallSite};
pub use object_cache::{CachedObject, ObjectCache, ObjectCacheKey, Purpose};
