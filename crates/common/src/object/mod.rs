mod identity;
mod metadata;

pub use identity::{ObjectIdentity, PathError, SEPARATOR};
pub use metadata::{stable_index, EntryKind, FileAttributes, MetadataRecord};
