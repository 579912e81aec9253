use std::fs::{File, FileTimes};
use std::io;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use common::object::MetadataRecord;

/// What the local replica of a remote file looks like right now
///
/// `creation_time` is only tracked where it can also be stamped (Windows);
/// elsewhere it is `None` and never takes part in comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalReplicaState {
    pub exists: bool,
    pub size: u64,
    pub creation_time: Option<DateTime<Utc>>,
    pub write_time: Option<DateTime<Utc>>,
}

/// Equal to the microsecond, the finest resolution every backend reports
pub fn timestamps_match(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.timestamp_micros() == b.timestamp_micros()
}

impl LocalReplicaState {
    pub fn absent() -> Self {
        Self {
            exists: false,
            size: 0,
            creation_time: None,
            write_time: None,
        }
    }

    pub fn inspect(path: &Path) -> io::Result<Self> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::absent()),
            Err(e) => return Err(e),
        };

        #[cfg(windows)]
        let creation_time = metadata.created().ok().map(DateTime::<Utc>::from);
        #[cfg(not(windows))]
        let creation_time = None;

        Ok(Self {
            exists: true,
            size: metadata.len(),
            creation_time,
            write_time: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Size, write time and (where tracked) creation time all agree
    pub fn matches(&self, remote: &MetadataRecord) -> bool {
        self.exists
            && self.size == remote.size()
            && self
                .write_time
                .is_some_and(|t| timestamps_match(t, remote.last_write_time()))
            && self
                .creation_time
                .map_or(true, |t| timestamps_match(t, remote.creation_time()))
    }
}

/// Set write (and on Windows creation) time, and mark the file accessed now
pub fn stamp_times(file: &File, creation: DateTime<Utc>, write: DateTime<Utc>) -> io::Result<()> {
    let times = FileTimes::new()
        .set_accessed(SystemTime::now())
        .set_modified(SystemTime::from(write));

    #[cfg(windows)]
    let times = {
        use std::os::windows::fs::FileTimesExt;
        times.set_created(SystemTime::from(creation))
    };
    #[cfg(not(windows))]
    let _ = creation;

    file.set_times(times)
}

/// Record a use of the replica for retention purposes
pub fn touch_accessed(file: &File) -> io::Result<()> {
    file.set_times(FileTimes::new().set_accessed(SystemTime::now()))
}

#[cfg(test)]
mod tests {
    use common::object::ObjectIdentity;

    use super::*;

    #[test]
    fn test_inspect_absent_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica");
        assert_eq!(LocalReplicaState::inspect(&path).unwrap(), LocalReplicaState::absent());

        std::fs::write(&path, b"abc").unwrap();
        let state = LocalReplicaState::inspect(&path).unwrap();
        assert!(state.exists);
        assert_eq!(state.size, 3);
        assert!(state.write_time.is_some());
    }

    #[test]
    fn test_stamp_then_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica");
        std::fs::write(&path, b"abc").unwrap();

        let identity = ObjectIdentity::parse_namespace_path("/b/f").unwrap();
        let written = DateTime::parse_from_rfc3339("2024-03-01T10:20:30.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let remote = MetadataRecord::file(&identity, 3, written, written);

        assert!(!LocalReplicaState::inspect(&path).unwrap().matches(&remote));

        let file = File::options().write(true).open(&path).unwrap();
        stamp_times(&file, remote.creation_time(), remote.last_write_time()).unwrap();
        assert!(LocalReplicaState::inspect(&path).unwrap().matches(&remote));

        let bigger = MetadataRecord::file(&identity, 4, written, written);
        assert!(!LocalReplicaState::inspect(&path).unwrap().matches(&bigger));
    }
}
