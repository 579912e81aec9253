//! The filesystem core exposed to a driver shim
//!
//! [`BucketFs`] answers stat and listing calls from the metadata caches,
//! reconciles local replicas on open, and pushes written files back to the
//! remote on close. A shim translates OS callbacks into these calls and maps
//! [`FsError::errno`] back into platform error codes.

mod bucket_fs;
mod context;
mod error;
mod handles;
mod tasks;

pub use bucket_fs::{BucketFs, EvictionStats, IdleStats, MountError};
pub use context::{DirectoryContext, FileContext, OpenContext, OpenMode};
pub use error::{FsError, FsResult};
