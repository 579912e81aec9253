use std::io;

use common::client::ClientError;
use common::object::PathError;

use crate::download::{DownloadError, PartError};
use crate::local::ReplicaError;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("remote temporarily unavailable: {0}")]
    Transient(String),
    #[error("local i/o error: {0}")]
    LocalIo(#[from] io::Error),
    #[error("local replica of {path} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },
    #[error(transparent)]
    PartialDownload(DownloadError),
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("handle not open for {0}")]
    BadHandle(&'static str),
    #[error("read-only mount")]
    ReadOnly,
    #[error("operation not supported: {0}")]
    NotSupported(String),
    #[error("remote call failed: {0}")]
    Client(String),
}

impl FsError {
    /// Platform error code handed back to the filesystem driver
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::Transient(_) => libc::EAGAIN,
            FsError::LocalIo(e) => e.raw_os_error().unwrap_or(libc::EIO),
            FsError::SizeMismatch { .. } | FsError::PartialDownload(_) | FsError::Client(_) => {
                libc::EIO
            }
            FsError::InvalidPath(_) => libc::EINVAL,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::DirectoryNotEmpty(_) => libc::ENOTEMPTY,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::BadHandle(_) => libc::EBADF,
            FsError::ReadOnly => libc::EROFS,
            FsError::NotSupported(_) => libc::ENOTSUP,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

impl From<ClientError> for FsError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::NotFound(path) => FsError::NotFound(path),
            ClientError::Transient(msg) => FsError::Transient(msg),
            ClientError::Fatal(msg) => FsError::Client(msg),
        }
    }
}

impl From<ReplicaError> for FsError {
    fn from(error: ReplicaError) -> Self {
        match error {
            ReplicaError::Io(e) => FsError::LocalIo(e),
            ReplicaError::SizeMismatch { expected, actual } => FsError::SizeMismatch {
                path: String::new(),
                expected,
                actual,
            },
        }
    }
}

impl From<DownloadError> for FsError {
    fn from(error: DownloadError) -> Self {
        match error {
            DownloadError::Part(PartError::Client(e)) => e.into(),
            DownloadError::Part(PartError::Io(e)) | DownloadError::Io(e) => FsError::LocalIo(e),
            other => FsError::PartialDownload(other),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
