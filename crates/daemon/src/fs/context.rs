use std::fs::File;
use std::path::PathBuf;

use common::object::{MetadataRecord, ObjectIdentity};

use super::handles::ReplicaHandle;

/// State behind one open handle
#[derive(Debug)]
pub enum OpenContext {
    Root,
    Bucket(DirectoryContext),
    Directory(DirectoryContext),
    File(FileContext),
}

#[derive(Debug)]
pub struct DirectoryContext {
    pub identity: ObjectIdentity,
    pub record: MetadataRecord,
}

#[derive(Debug)]
pub struct FileContext {
    pub identity: ObjectIdentity,
    /// Remote metadata at open time
    pub record: MetadataRecord,
    pub local_path: PathBuf,
    pub file: File,
    pub writable: bool,
    pub(crate) handle: ReplicaHandle,
}

impl FileContext {
    /// Written since open or since the last upload
    pub fn is_dirty(&self) -> bool {
        self.handle.is_dirty()
    }
}

impl OpenContext {
    pub fn identity(&self) -> ObjectIdentity {
        match self {
            OpenContext::Root => ObjectIdentity::root(),
            OpenContext::Bucket(ctx) | OpenContext::Directory(ctx) => ctx.identity.clone(),
            OpenContext::File(ctx) => ctx.identity.clone(),
        }
    }

    pub fn is_directory(&self) -> bool {
        !matches!(self, OpenContext::File(_))
    }

    pub fn as_file(&self) -> Option<&FileContext> {
        match self {
            OpenContext::File(ctx) => Some(ctx),
            _ => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileContext> {
        match self {
            OpenContext::File(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}
