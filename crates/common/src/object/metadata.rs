//! Directory entry metadata returned to filesystem callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ObjectIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Bucket,
    Directory,
    File,
}

/// Attribute bits reported for an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub hidden: bool,
    pub readonly: bool,
    pub directory: bool,
}

/// One directory entry
///
/// Built by a client from a head or listing response and never mutated
/// afterwards; caches hand out clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    name: String,
    kind: EntryKind,
    size: u64,
    creation_time: DateTime<Utc>,
    last_access_time: DateTime<Utc>,
    last_write_time: DateTime<Utc>,
    change_time: DateTime<Utc>,
    attributes: FileAttributes,
    index: u64,
}

/// Stable 64-bit node id for a namespace path
pub fn stable_index(path: &str) -> u64 {
    let digest = Sha256::digest(path.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

impl MetadataRecord {
    fn build(
        identity: &ObjectIdentity,
        kind: EntryKind,
        size: u64,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    ) -> Self {
        Self {
            name: identity.name().to_string(),
            kind,
            size,
            creation_time: created,
            last_access_time: modified,
            last_write_time: modified,
            change_time: modified,
            attributes: FileAttributes {
                hidden: identity.is_hidden(),
                readonly: false,
                directory: kind != EntryKind::File,
            },
            index: stable_index(&identity.to_file_form().to_string()),
        }
    }

    pub fn file(
        identity: &ObjectIdentity,
        size: u64,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
    ) -> Self {
        Self::build(identity, EntryKind::File, size, created, modified)
    }

    pub fn directory(identity: &ObjectIdentity, modified: DateTime<Utc>) -> Self {
        Self::build(identity, EntryKind::Directory, 0, modified, modified)
    }

    pub fn bucket(name: &str, created: DateTime<Utc>) -> Self {
        Self::build(
            &ObjectIdentity::bucket_root(name),
            EntryKind::Bucket,
            0,
            created,
            created,
        )
    }

    /// Synthetic entry for the namespace root
    pub fn root(time: DateTime<Utc>) -> Self {
        Self::build(
            &ObjectIdentity::root(),
            EntryKind::Directory,
            0,
            time,
            time,
        )
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.attributes.readonly = readonly;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind != EntryKind::File
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn last_access_time(&self) -> DateTime<Utc> {
        self.last_access_time
    }

    pub fn last_write_time(&self) -> DateTime<Utc> {
        self.last_write_time
    }

    pub fn change_time(&self) -> DateTime<Utc> {
        self.change_time
    }

    pub fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    pub fn index(&self) -> u64 {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record() {
        let identity = ObjectIdentity::parse_namespace_path("/b/docs/.notes.md").unwrap();
        let now = Utc::now();
        let record = MetadataRecord::file(&identity, 42, now, now);

        assert_eq!(record.name(), ".notes.md");
        assert_eq!(record.kind(), EntryKind::File);
        assert_eq!(record.size(), 42);
        assert!(record.attributes().hidden);
        assert!(!record.attributes().directory);
        assert!(!record.attributes().readonly);
        assert!(record.with_readonly(true).attributes().readonly);
    }

    #[test]
    fn test_index_is_stable_across_forms() {
        let now = Utc::now();
        let dir = ObjectIdentity::parse_namespace_path("/b/docs/").unwrap();
        let a = MetadataRecord::directory(&dir, now);
        let b = MetadataRecord::directory(&dir.to_file_form(), now);
        assert_eq!(a.index(), b.index());
        assert_eq!(a.index(), stable_index("/b/docs"));
        assert_ne!(a.index(), stable_index("/b/docs2"));
    }

    #[test]
    fn test_bucket_and_root_records() {
        let now = Utc::now();
        let bucket = MetadataRecord::bucket("photos", now);
        assert_eq!(bucket.name(), "photos");
        assert!(bucket.is_directory());
        assert!(bucket.attributes().directory);

        let root = MetadataRecord::root(now);
        assert_eq!(root.name(), "");
        assert_eq!(root.kind(), EntryKind::Directory);
    }
}
