mod common;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bucketfs_daemon::BucketFs;
use crate::common::{config, id, init_tracing};

use ::common::client::{ClientError, ObjectClient, ObjectReader, PutAttributes};
use ::common::object::{MetadataRecord, ObjectIdentity};
use object_store::{RemoteConfig, StoreClient};

/// Counts ranged reads on the way to a [`StoreClient`]
#[derive(Debug)]
struct CountingClient {
    inner: StoreClient,
    ranged_reads: AtomicU64,
}

impl ObjectClient for CountingClient {
    fn list_buckets(&self) -> Result<Vec<MetadataRecord>, ClientError> {
        self.inner.list_buckets()
    }

    fn bucket_region(&self, bucket: &str) -> Result<String, ClientError> {
        self.inner.bucket_region(bucket)
    }

    fn head_object(
        &self,
        identity: &ObjectIdentity,
    ) -> Result<Option<MetadataRecord>, ClientError> {
        self.inner.head_object(identity)
    }

    fn list_objects(
        &self,
        identity: &ObjectIdentity,
        delimiter: Option<char>,
        limit: Option<usize>,
    ) -> Result<Vec<MetadataRecord>, ClientError> {
        self.inner.list_objects(identity, delimiter, limit)
    }

    fn get_object_range(
        &self,
        identity: &ObjectIdentity,
        offset: u64,
        length: u64,
    ) -> Result<ObjectReader, ClientError> {
        self.ranged_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_object_range(identity, offset, length)
    }

    fn put_object(
        &self,
        identity: &ObjectIdentity,
        source: Option<&Path>,
        attrs: &PutAttributes,
    ) -> Result<(), ClientError> {
        self.inner.put_object(identity, source, attrs)
    }

    fn delete_object(&self, identity: &ObjectIdentity) -> Result<(), ClientError> {
        self.inner.delete_object(identity)
    }

    fn listings_carry_put_times(&self) -> bool {
        self.inner.listings_carry_put_times()
    }
}

fn mount_store() -> (BucketFs, Arc<CountingClient>, tempfile::TempDir) {
    init_tracing();
    let store = StoreClient::from_config(&RemoteConfig {
        buckets: vec!["docs".to_string()],
        ..Default::default()
    })
    .unwrap();
    let client = Arc::new(CountingClient {
        inner: store,
        ranged_reads: AtomicU64::new(0),
    });
    let dir = tempfile::tempdir().unwrap();
    let fs = BucketFs::mount(
        client.clone(),
        config(),
        dir.path().join("cache"),
        dir.path().join("reports"),
    )
    .unwrap();
    (fs, client, dir)
}

#[test]
fn test_uploaded_replica_survives_directory_listing() {
    let (fs, client, _dir) = mount_store();
    let path = id("/docs/notes.txt");

    fs.create_empty(&path, false).unwrap();
    let mut context = fs.open_for_write(&path).unwrap();
    fs.write(&mut context, 0, b"kept locally").unwrap();
    fs.close(context).unwrap();

    let names: Vec<_> = fs
        .list_directory(&id("/docs"))
        .unwrap()
        .iter()
        .map(|record| record.name().to_string())
        .collect();
    assert_eq!(names, vec!["notes.txt"]);

    let context = fs.open_for_read(&path).unwrap();
    let mut buf = [0u8; 32];
    let n = fs.read(&context, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"kept locally");
    fs.close(context).unwrap();
    assert_eq!(client.ranged_reads.load(Ordering::SeqCst), 0);

    let record = fs.stat(&path).unwrap();
    assert_eq!(record.size(), 12);
    fs.unmount();
}

#[test]
fn test_listing_leaves_file_heads_to_the_store() {
    let (fs, _client, _dir) = mount_store();
    fs.create_empty(&id("/docs/a.txt"), false).unwrap();

    fs.list_directory(&id("/docs")).unwrap();
    let cached = fs.object_cache().get_head(&id("/docs/a.txt"));
    assert!(cached.is_none());
    assert!(fs.stat(&id("/docs/a.txt")).unwrap().is_file());
    fs.unmount();
}
