use std::panic::Location;

use chrono::{DateTime, Utc};

/// Source location of the call that created or last read an entry
pub type CallSite = &'static Location<'static>;

/// One cached answer
///
/// `value == None` marks a negative entry: the remote confirmed absence.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: Option<V>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub created_by: CallSite,
    pub last_accessed_by: CallSite,
    pub ref_count: u64,
}

impl<V> CacheEntry<V> {
    pub fn positive(value: V, now: DateTime<Utc>, by: CallSite) -> Self {
        Self {
            value: Some(value),
            created_at: now,
            last_accessed_at: now,
            created_by: by,
            last_accessed_by: by,
            ref_count: 0,
        }
    }

    pub fn negative(now: DateTime<Utc>, by: CallSite) -> Self {
        Self {
            value: None,
            created_at: now,
            last_accessed_at: now,
            created_by: by,
            last_accessed_by: by,
            ref_count: 0,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.value.is_none()
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>, by: CallSite) {
        self.last_accessed_at = now;
        self.last_accessed_by = by;
        self.ref_count += 1;
    }
}
