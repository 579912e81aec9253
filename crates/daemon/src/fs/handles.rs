use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    handles: usize,
    /// Handles holding writes not yet uploaded
    dirty: usize,
}

/// Local replicas currently backing open file handles
#[derive(Debug, Default)]
pub(crate) struct OpenReplicas {
    replicas: Mutex<HashMap<PathBuf, Usage>>,
}

impl OpenReplicas {
    pub(crate) fn register(self: &Arc<Self>, path: &Path) -> ReplicaHandle {
        self.replicas
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .handles += 1;
        ReplicaHandle {
            replicas: self.clone(),
            path: path.to_path_buf(),
            dirty: false,
        }
    }

    pub(crate) fn is_open(&self, path: &Path) -> bool {
        self.replicas.lock().contains_key(path)
    }

    pub(crate) fn handles(&self, path: &Path) -> usize {
        self.replicas.lock().get(path).map_or(0, |usage| usage.handles)
    }

    /// Whether some handle wrote to the replica and has not uploaded it yet
    pub(crate) fn has_unsent_writes(&self, path: &Path) -> bool {
        self.replicas
            .lock()
            .get(path)
            .is_some_and(|usage| usage.dirty > 0)
    }

    pub(crate) fn len(&self) -> usize {
        self.replicas.lock().len()
    }

    fn update(&self, path: &Path, change: impl FnOnce(&mut Usage)) {
        let mut replicas = self.replicas.lock();
        if let Some(usage) = replicas.get_mut(path) {
            change(usage);
            if usage.handles == 0 {
                replicas.remove(path);
            }
        }
    }
}

/// Registration of one open handle, released on drop
#[derive(Debug)]
pub(crate) struct ReplicaHandle {
    replicas: Arc<OpenReplicas>,
    path: PathBuf,
    dirty: bool,
}

impl ReplicaHandle {
    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        if !self.dirty {
            self.dirty = true;
            self.replicas.update(&self.path, |usage| usage.dirty += 1);
        }
    }

    pub(crate) fn mark_clean(&mut self) {
        if self.dirty {
            self.dirty = false;
            self.replicas
                .update(&self.path, |usage| usage.dirty = usage.dirty.saturating_sub(1));
        }
    }
}

impl Drop for ReplicaHandle {
    fn drop(&mut self) {
        let dirty = self.dirty;
        self.replicas.update(&self.path, |usage| {
            usage.handles = usage.handles.saturating_sub(1);
            if dirty {
                usage.dirty = usage.dirty.saturating_sub(1);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_counted_per_replica() {
        let replicas = Arc::new(OpenReplicas::default());
        let path = Path::new("/cache/ab/cdef");

        let first = replicas.register(path);
        let mut second = replicas.register(path);
        assert_eq!(replicas.handles(path), 2);
        assert!(!replicas.has_unsent_writes(path));

        second.mark_dirty();
        second.mark_dirty();
        assert!(replicas.has_unsent_writes(path));
        drop(first);
        assert!(replicas.has_unsent_writes(path));

        second.mark_clean();
        assert!(!replicas.has_unsent_writes(path));
        assert!(replicas.is_open(path));
        drop(second);
        assert!(!replicas.is_open(path));
        assert_eq!(replicas.len(), 0);
    }

    #[test]
    fn test_dropping_dirty_handle_clears_writes() {
        let replicas = Arc::new(OpenReplicas::default());
        let path = Path::new("/cache/01/23");
        let mut handle = replicas.register(path);
        handle.mark_dirty();
        drop(handle);
        assert!(!replicas.has_unsent_writes(path));
        assert_eq!(replicas.handles(path), 0);
    }
}
