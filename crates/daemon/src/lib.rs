//! bucketfs: object storage buckets seen as a filesystem
//!
//! The library holds everything a filesystem driver shim needs:
//!
//! - [`cache`]: positive/negative metadata caches for the bucket list and
//!   for object head/list answers
//! - [`local`]: local replica paths and the reconciliation decision table
//! - [`download`]: parallel multipart downloads on the delayed worker pool
//! - [`fs`]: the [`BucketFs`] facade tying it together
//! - [`config`], [`state`]: configuration and the work directory layout

pub mod cache;
pub mod config;
pub mod download;
pub mod fs;
pub mod local;
pub mod report;
pub mod state;

pub use config::{Config, ConfigError};
pub use fs::{BucketFs, FsError, FsResult, MountError, OpenContext, OpenMode};
pub use report::FsReport;
pub use state::{AppState, StateError};
