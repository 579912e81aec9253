pub mod memory;

use std::fmt::Debug;
use std::io::{self, Read};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::object::{MetadataRecord, ObjectIdentity};

pub use memory::{ClientCallCounts, MemoryClient};

/// Outcome classification for a remote call
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The object (or bucket) does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Network or service failure; worth asking again later
    #[error("transient remote failure: {0}")]
    Transient(String),
    /// Credentials, malformed request, unsupported operation
    #[error("remote call failed: {0}")]
    Fatal(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Carry a remote failure out of an [`ObjectReader`]
    pub fn into_read_error(self) -> io::Error {
        io::Error::new(io::ErrorKind::Other, self)
    }

    /// The remote failure behind an [`ObjectReader`] error, or the local
    /// error unchanged
    pub fn from_read_error(error: io::Error) -> Result<Self, io::Error> {
        if !error.get_ref().is_some_and(|inner| inner.is::<ClientError>()) {
            return Err(error);
        }
        let kind = error.kind();
        match error.into_inner().map(|inner| inner.downcast::<ClientError>()) {
            Some(Ok(remote)) => Ok(*remote),
            Some(Err(inner)) => Err(io::Error::new(kind, inner)),
            None => Err(io::Error::from(kind)),
        }
    }
}

/// Byte stream of a ranged GET
pub type ObjectReader = Box<dyn Read + Send>;

/// Metadata carried along with an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutAttributes {
    pub creation_time: Option<DateTime<Utc>>,
    pub last_write_time: Option<DateTime<Utc>>,
}

/// Provider-agnostic object storage API
///
/// Every call is blocking. Callers run on filesystem callback threads or on
/// worker pool threads, never inside an async runtime.
pub trait ObjectClient: Send + Sync + Debug {
    /// Every bucket visible to the configured credentials
    fn list_buckets(&self) -> Result<Vec<MetadataRecord>, ClientError>;

    fn bucket_region(&self, bucket: &str) -> Result<String, ClientError>;

    /// Metadata of a single object, or `None` if there is no such key
    ///
    /// For directory identities this only finds an explicit marker object
    /// (`dir/`), never a directory implied by deeper keys.
    fn head_object(&self, identity: &ObjectIdentity)
        -> Result<Option<MetadataRecord>, ClientError>;

    /// Entries below a directory identity
    ///
    /// With a delimiter, keys below the next delimiter are folded into one
    /// directory entry per common prefix. The listed directory's own marker
    /// object is never returned.
    fn list_objects(
        &self,
        identity: &ObjectIdentity,
        delimiter: Option<char>,
        limit: Option<usize>,
    ) -> Result<Vec<MetadataRecord>, ClientError>;

    /// Stream `length` bytes starting at `offset`
    fn get_object_range(
        &self,
        identity: &ObjectIdentity,
        offset: u64,
        length: u64,
    ) -> Result<ObjectReader, ClientError>;

    /// Upload `source` (or an empty body) to `identity`
    fn put_object(
        &self,
        identity: &ObjectIdentity,
        source: Option<&Path>,
        attrs: &PutAttributes,
    ) -> Result<(), ClientError>;

    fn delete_object(&self, identity: &ObjectIdentity) -> Result<(), ClientError>;

    /// Whether file records from [`ObjectClient::list_objects`] carry the
    /// times given to [`ObjectClient::put_object`]
    ///
    /// When they don't, only [`ObjectClient::head_object`] answers are good
    /// enough to compare against a local replica.
    fn listings_carry_put_times(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_keeps_classification() {
        let error = ClientError::Transient("connection reset".into()).into_read_error();
        assert_eq!(
            ClientError::from_read_error(error).unwrap(),
            ClientError::Transient("connection reset".into())
        );

        let local = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let local = ClientError::from_read_error(local).unwrap_err();
        assert_eq!(local.kind(), io::ErrorKind::PermissionDenied);
        assert!(ClientError::from_read_error(io::Error::from(io::ErrorKind::UnexpectedEof)).is_err());
    }
}
