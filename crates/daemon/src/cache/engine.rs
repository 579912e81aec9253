//! Positive/negative metadata cache shared by the bucket and object caches
//!
//! Two maps live under one mutex: positive entries hold a value, negative
//! entries record that the remote confirmed absence. A key is never in both
//! maps. Entries expire by creation age only; the periodic scheduler calls
//! [`MetadataCache::evict_older_than`] with the configured TTL.
//!
//! Every mutating or reading call records its caller's source location, so a
//! diagnostics report shows which code path created or last used an entry.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::panic::Location;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::entry::{CacheEntry, CallSite};

/// Keys know which other keys cache answers derived from their object
pub trait CacheKey: Clone + Eq + Hash + Display {
    /// Keys to drop alongside this one when its object changes remotely
    fn parent_keys(&self) -> Vec<Self> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounters {
    pub get_positive: u64,
    pub set_positive: u64,
    pub update_positive: u64,
    pub get_negative: u64,
    pub set_negative: u64,
    pub update_negative: u64,
    pub invalidated: u64,
    pub evicted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub age_secs: i64,
    pub created_by: String,
    pub last_accessed_by: String,
    pub ref_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub name: &'static str,
    pub counters: CacheCounters,
    pub positive: Vec<EntryReport>,
    pub negative: Vec<EntryReport>,
}

struct CacheMaps<K, V> {
    positive: HashMap<K, CacheEntry<V>>,
    negative: HashMap<K, CacheEntry<V>>,
    counters: CacheCounters,
}

pub struct MetadataCache<K, V> {
    name: &'static str,
    maps: Mutex<CacheMaps<K, V>>,
}

impl<K, V> std::fmt::Debug for MetadataCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let maps = self.maps.lock();
        f.debug_struct("MetadataCache")
            .field("name", &self.name)
            .field("positive", &maps.positive.len())
            .field("negative", &maps.negative.len())
            .finish()
    }
}

fn location(site: CallSite) -> String {
    format!("{}:{}", site.file(), site.line())
}

fn entry_report<K: Display, V>(key: &K, entry: &CacheEntry<V>, now: DateTime<Utc>) -> EntryReport {
    EntryReport {
        key: key.to_string(),
        created_at: entry.created_at,
        last_accessed_at: entry.last_accessed_at,
        age_secs: (now - entry.created_at).num_seconds(),
        created_by: location(entry.created_by),
        last_accessed_by: location(entry.last_accessed_by),
        ref_count: entry.ref_count,
    }
}

impl<K: CacheKey, V: Clone> MetadataCache<K, V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            maps: Mutex::new(CacheMaps {
                positive: HashMap::new(),
                negative: HashMap::new(),
                counters: CacheCounters::default(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Copy of the positive value for `key`
    #[track_caller]
    pub fn get_positive(&self, key: &K) -> Option<V> {
        let caller = Location::caller();
        let now = Utc::now();
        let mut guard = self.maps.lock();
        let maps = &mut *guard;
        let entry = maps.positive.get_mut(key)?;
        entry.touch(now, caller);
        maps.counters.get_positive += 1;
        entry.value.clone()
    }

    #[track_caller]
    pub fn set_positive(&self, key: K, value: V) {
        let caller = Location::caller();
        let now = Utc::now();
        let mut guard = self.maps.lock();
        let maps = &mut *guard;
        maps.negative.remove(&key);
        match maps.positive.get_mut(&key) {
            Some(entry) => {
                entry.value = Some(value);
                entry.created_at = now;
                entry.touch(now, caller);
                maps.counters.update_positive += 1;
            }
            None => {
                maps.positive
                    .insert(key, CacheEntry::positive(value, now, caller));
                maps.counters.set_positive += 1;
            }
        }
    }

    /// True if the remote confirmed `key` absent
    #[track_caller]
    pub fn is_negative(&self, key: &K) -> bool {
        let caller = Location::caller();
        let now = Utc::now();
        let mut guard = self.maps.lock();
        let maps = &mut *guard;
        match maps.negative.get_mut(key) {
            Some(entry) => {
                entry.touch(now, caller);
                maps.counters.get_negative += 1;
                true
            }
            None => false,
        }
    }

    #[track_caller]
    pub fn add_negative(&self, key: K) {
        let caller = Location::caller();
        let now = Utc::now();
        let mut guard = self.maps.lock();
        let maps = &mut *guard;
        maps.positive.remove(&key);
        match maps.negative.get_mut(&key) {
            Some(entry) => {
                entry.created_at = now;
                entry.touch(now, caller);
                maps.counters.update_negative += 1;
            }
            None => {
                maps.negative.insert(key, CacheEntry::negative(now, caller));
                maps.counters.set_negative += 1;
            }
        }
    }

    /// Drop `key` and its parent keys from both maps
    pub fn invalidate(&self, key: &K) -> usize {
        let mut keys = key.parent_keys();
        keys.push(key.clone());

        let mut guard = self.maps.lock();
        let maps = &mut *guard;
        let mut removed = 0;
        for key in &keys {
            removed += usize::from(maps.positive.remove(key).is_some());
            removed += usize::from(maps.negative.remove(key).is_some());
        }
        maps.counters.invalidated += removed as u64;
        removed
    }

    /// Drop every entry whose key matches `predicate`
    pub fn remove_where(&self, predicate: impl Fn(&K) -> bool) -> usize {
        let mut guard = self.maps.lock();
        let maps = &mut *guard;
        let before = maps.positive.len() + maps.negative.len();
        maps.positive.retain(|key, _| !predicate(key));
        maps.negative.retain(|key, _| !predicate(key));
        let removed = before - (maps.positive.len() + maps.negative.len());
        maps.counters.invalidated += removed as u64;
        removed
    }

    /// Drop every entry created strictly before `threshold`
    pub fn evict_older_than(&self, threshold: DateTime<Utc>) -> usize {
        let mut guard = self.maps.lock();
        let maps = &mut *guard;
        let before = maps.positive.len() + maps.negative.len();
        maps.positive.retain(|_, entry| entry.created_at >= threshold);
        maps.negative.retain(|_, entry| entry.created_at >= threshold);
        let removed = before - (maps.positive.len() + maps.negative.len());
        maps.counters.evicted += removed as u64;
        if removed > 0 {
            tracing::debug!(cache = self.name, removed, %threshold, "evicted expired entries");
        }
        removed
    }

    pub fn clear(&self) -> usize {
        let mut guard = self.maps.lock();
        let removed = guard.positive.len() + guard.negative.len();
        guard.positive.clear();
        guard.negative.clear();
        removed
    }

    pub fn positive_len(&self) -> usize {
        self.maps.lock().positive.len()
    }

    pub fn negative_len(&self) -> usize {
        self.maps.lock().negative.len()
    }

    pub fn counters(&self) -> CacheCounters {
        self.maps.lock().counters
    }

    /// Snapshot of every entry, sorted by key
    pub fn report(&self) -> CacheReport {
        let now = Utc::now();
        let maps = self.maps.lock();
        let mut positive: Vec<_> = maps
            .positive
            .iter()
            .map(|(key, entry)| entry_report(key, entry, now))
            .collect();
        let mut negative: Vec<_> = maps
            .negative
            .iter()
            .map(|(key, entry)| entry_report(key, entry, now))
            .collect();
        positive.sort_by(|a, b| a.key.cmp(&b.key));
        negative.sort_by(|a, b| a.key.cmp(&b.key));
        CacheReport {
            name: self.name,
            counters: maps.counters,
            positive,
            negative,
        }
    }
}
