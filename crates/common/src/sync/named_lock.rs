//! Per-name mutual exclusion
//!
//! A registry hands out one lock per name, created on first use and removed
//! once the last interested caller is gone. Callers using different names
//! never contend beyond the short registry-wide critical section.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct KeyLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl KeyLock {
    fn lock(&self) {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
    }

    fn unlock(&self) {
        *self.held.lock() = false;
        self.released.notify_one();
    }
}

#[derive(Debug)]
struct Slot {
    lock: Arc<KeyLock>,
    refs: usize,
}

#[derive(Debug)]
pub struct NamedLockRegistry {
    purpose: &'static str,
    slots: Mutex<HashMap<String, Slot>>,
}

/// Holds the lock for one name until dropped
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct NamedLockGuard<'a> {
    registry: &'a NamedLockRegistry,
    key: String,
    lock: Arc<KeyLock>,
}

impl NamedLockRegistry {
    pub fn new(purpose: &'static str) -> Self {
        Self {
            purpose,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn purpose(&self) -> &'static str {
        self.purpose
    }

    /// Block until the lock for `key` is held by the caller
    pub fn acquire(&self, key: &str) -> NamedLockGuard<'_> {
        let lock = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(KeyLock::default()),
                refs: 0,
            });
            slot.refs += 1;
            slot.lock.clone()
        };

        lock.lock();
        tracing::trace!(purpose = self.purpose, key, "named lock acquired");

        NamedLockGuard {
            registry: self,
            key: key.to_string(),
            lock,
        }
    }

    /// Number of names with a holder or waiter
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Holders plus waiters for `key`
    pub fn ref_count(&self, key: &str) -> usize {
        self.slots.lock().get(key).map_or(0, |slot| slot.refs)
    }

    /// Snapshot of every live name and its reference count, sorted by name
    pub fn snapshot(&self) -> Vec<(String, usize)> {
        let mut entries: Vec<_> = self
            .slots
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.refs))
            .collect();
        entries.sort();
        entries
    }

    fn release(&self, key: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(key) {
            slot.refs -= 1;
            if slot.refs == 0 {
                slots.remove(key);
            }
        }
    }
}

impl NamedLockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for NamedLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock();
        self.registry.release(&self.key);
        tracing::trace!(
            purpose = self.registry.purpose,
            key = %self.key,
            "named lock released"
        );
    }
}
