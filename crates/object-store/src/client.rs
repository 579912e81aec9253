use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::{
    Attribute, Attributes, GetOptions, GetRange, ObjectMeta, ObjectStore, PutOptions, PutPayload,
};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use common::client::{ClientError, ObjectClient, ObjectReader, PutAttributes};
use common::object::{MetadataRecord, ObjectIdentity, SEPARATOR};

use crate::config::{ObjectStoreConfig, RemoteConfig};
use crate::reader::BlockingStreamReader;

#[derive(Debug, thiserror::Error)]
pub enum StoreSetupError {
    #[error("failed to start the i/o runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("failed to configure object store: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("no buckets configured")]
    NoBuckets,
}

const CREATION_TIME: &str = "bucketfs-creation-time";
const LAST_WRITE_TIME: &str = "bucketfs-last-write-time";

struct BucketStore {
    region: String,
    store: Arc<dyn ObjectStore>,
    /// Cleared once the store refuses object attributes
    times_in_metadata: AtomicBool,
}

pub struct StoreClient {
    runtime: Arc<Runtime>,
    buckets: BTreeMap<String, BucketStore>,
    created: DateTime<Utc>,
}

impl fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient")
            .field("buckets", &self.buckets.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn classify(error: object_store::Error) -> ClientError {
    match error {
        object_store::Error::NotFound { path, .. } => ClientError::NotFound(path),
        e @ object_store::Error::Generic { .. } => ClientError::Transient(e.to_string()),
        e => ClientError::Fatal(e.to_string()),
    }
}

/// object_store paths have no trailing separator and no empty segments
fn store_path(key: &str) -> StorePath {
    StorePath::from(key.trim_end_matches(SEPARATOR))
}

fn prefix_path(identity: &ObjectIdentity) -> Option<StorePath> {
    if identity.key().is_empty() {
        None
    } else {
        Some(store_path(identity.key()))
    }
}

impl StoreClient {
    pub fn from_config(config: &RemoteConfig) -> Result<Self, StoreSetupError> {
        if config.buckets.is_empty() {
            return Err(StoreSetupError::NoBuckets);
        }
        let mut stores = Vec::with_capacity(config.buckets.len());
        for bucket in &config.buckets {
            let store: Arc<dyn ObjectStore> = match &config.store {
                ObjectStoreConfig::S3 {
                    endpoint,
                    access_key,
                    secret_key,
                    allow_http,
                } => {
                    let mut builder = AmazonS3Builder::new()
                        .with_bucket_name(bucket)
                        .with_region(&config.region)
                        .with_allow_http(*allow_http);
                    if let Some(endpoint) = endpoint {
                        builder = builder.with_endpoint(endpoint);
                    }
                    if let Some(access_key) = access_key {
                        builder = builder.with_access_key_id(access_key);
                    }
                    if let Some(secret_key) = secret_key {
                        builder = builder.with_secret_access_key(secret_key);
                    }
                    Arc::new(builder.build()?)
                }
                ObjectStoreConfig::Local { path } => {
                    let root = path.join(bucket);
                    std::fs::create_dir_all(&root)?;
                    Arc::new(LocalFileSystem::new_with_prefix(root)?)
                }
                ObjectStoreConfig::Memory => Arc::new(InMemory::new()),
            };
            stores.push((bucket.clone(), config.region.clone(), store));
        }
        info!(buckets = ?config.buckets, "object store client configured");
        Self::from_stores(stores, config.io_threads)
    }

    /// Build from ready-made stores, one per `(bucket, region, store)`
    pub fn from_stores(
        stores: impl IntoIterator<Item = (String, String, Arc<dyn ObjectStore>)>,
        io_threads: usize,
    ) -> Result<Self, StoreSetupError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(io_threads.max(1))
            .thread_name("bucketfs-io")
            .enable_all()
            .build()?;
        let buckets = stores
            .into_iter()
            .map(|(name, region, store)| {
                (
                    name,
                    BucketStore {
                        region,
                        store,
                        times_in_metadata: AtomicBool::new(true),
                    },
                )
            })
            .collect();
        Ok(Self {
            runtime: Arc::new(runtime),
            buckets,
            created: Utc::now(),
        })
    }

    fn bucket(&self, identity: &ObjectIdentity) -> Result<&BucketStore, ClientError> {
        self.buckets
            .get(identity.bucket())
            .ok_or_else(|| ClientError::NotFound(identity.bucket().to_string()))
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn file_record(identity: &ObjectIdentity, meta: &ObjectMeta) -> MetadataRecord {
        MetadataRecord::file(
            identity,
            meta.size as u64,
            meta.last_modified,
            meta.last_modified,
        )
    }

    /// Record for a file head, preferring the times stored by `put_object`
    fn head_record(
        identity: &ObjectIdentity,
        meta: &ObjectMeta,
        attributes: &Attributes,
    ) -> MetadataRecord {
        let stored = |name: &'static str| {
            attributes
                .get(&Attribute::Metadata(name.into()))
                .and_then(|value| DateTime::parse_from_rfc3339(&**value).ok())
                .map(|time| time.with_timezone(&Utc))
        };
        MetadataRecord::file(
            identity,
            meta.size as u64,
            stored(CREATION_TIME).unwrap_or(meta.last_modified),
            stored(LAST_WRITE_TIME).unwrap_or(meta.last_modified),
        )
    }

    fn put_times(attrs: &PutAttributes) -> Attributes {
        let mut attributes = Attributes::new();
        let times = [
            (CREATION_TIME, attrs.creation_time),
            (LAST_WRITE_TIME, attrs.last_write_time),
        ];
        for (name, time) in times {
            if let Some(time) = time {
                attributes.insert(
                    Attribute::Metadata(name.into()),
                    time.to_rfc3339_opts(SecondsFormat::Micros, true).into(),
                );
            }
        }
        attributes
    }

    fn head_directory(
        &self,
        store: &dyn ObjectStore,
        identity: &ObjectIdentity,
    ) -> Result<Option<MetadataRecord>, ClientError> {
        let prefix = prefix_path(identity);
        let listing = self
            .block_on(store.list_with_delimiter(prefix.as_ref()))
            .map_err(classify)?;
        if listing.objects.is_empty() && listing.common_prefixes.is_empty() {
            return Ok(None);
        }
        let modified = listing
            .objects
            .iter()
            .map(|meta| meta.last_modified)
            .min()
            .unwrap_or(self.created);
        Ok(Some(MetadataRecord::directory(identity, modified)))
    }
}

impl ObjectClient for StoreClient {
    fn list_buckets(&self) -> Result<Vec<MetadataRecord>, ClientError> {
        Ok(self
            .buckets
            .keys()
            .map(|name| MetadataRecord::bucket(name, self.created))
            .collect())
    }

    fn bucket_region(&self, bucket: &str) -> Result<String, ClientError> {
        self.buckets
            .get(bucket)
            .map(|b| b.region.clone())
            .ok_or_else(|| ClientError::NotFound(bucket.to_string()))
    }

    fn head_object(
        &self,
        identity: &ObjectIdentity,
    ) -> Result<Option<MetadataRecord>, ClientError> {
        if identity.is_root() {
            return Err(ClientError::Fatal("the root is not an object".to_string()));
        }
        let Ok(bucket) = self.bucket(identity) else {
            return Ok(None);
        };
        if identity.is_bucket() {
            return Ok(Some(MetadataRecord::bucket(identity.bucket(), self.created)));
        }
        if identity.is_directory() {
            return self.head_directory(bucket.store.as_ref(), identity);
        }

        let options = GetOptions {
            head: true,
            ..Default::default()
        };
        match self.block_on(bucket.store.get_opts(&store_path(identity.key()), options)) {
            Ok(result) => Ok(Some(Self::head_record(
                identity,
                &result.meta,
                &result.attributes,
            ))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }

    fn list_objects(
        &self,
        identity: &ObjectIdentity,
        delimiter: Option<char>,
        limit: Option<usize>,
    ) -> Result<Vec<MetadataRecord>, ClientError> {
        if identity.is_root() || !identity.is_directory() {
            return Err(ClientError::Fatal(format!(
                "not a listable prefix: {identity}"
            )));
        }
        let bucket = self.bucket(identity)?;
        let prefix = prefix_path(identity);
        let limit = limit.unwrap_or(usize::MAX);

        if delimiter.is_none() {
            let store = bucket.store.clone();
            let metas: Vec<ObjectMeta> = self
                .block_on(async move {
                    store
                        .list(prefix.as_ref())
                        .take(limit)
                        .try_collect()
                        .await
                })
                .map_err(classify)?;
            let base = identity.key();
            return Ok(metas
                .iter()
                .map(|meta| {
                    let full = meta.location.as_ref();
                    let relative = full
                        .strip_prefix(base.trim_end_matches(SEPARATOR))
                        .map(|rest| rest.trim_start_matches(SEPARATOR))
                        .unwrap_or(full);
                    Self::file_record(&identity.append(relative), meta)
                })
                .collect());
        }

        let listing = self
            .block_on(bucket.store.list_with_delimiter(prefix.as_ref()))
            .map_err(classify)?;

        let oldest = listing
            .objects
            .iter()
            .map(|meta| meta.last_modified)
            .min()
            .unwrap_or(self.created);

        let mut directory_names = Vec::with_capacity(listing.common_prefixes.len());
        let mut records = Vec::with_capacity(listing.common_prefixes.len() + listing.objects.len());
        for common_prefix in &listing.common_prefixes {
            let Some(name) = common_prefix.filename() else {
                continue;
            };
            directory_names.push(name.to_string());
            let child = identity.append(&format!("{name}{SEPARATOR}"));
            records.push(MetadataRecord::directory(&child, oldest));
        }
        for meta in &listing.objects {
            let Some(name) = meta.location.filename() else {
                continue;
            };
            if directory_names.iter().any(|dir| dir == name) {
                continue;
            }
            records.push(Self::file_record(&identity.append(name), meta));
        }
        records.truncate(limit);
        Ok(records)
    }

    fn get_object_range(
        &self,
        identity: &ObjectIdentity,
        offset: u64,
        length: u64,
    ) -> Result<ObjectReader, ClientError> {
        let bucket = self.bucket(identity)?;
        if length == 0 {
            return Ok(Box::new(std::io::empty()));
        }
        let options = GetOptions {
            range: Some(GetRange::Bounded(
                offset as usize..offset.saturating_add(length) as usize,
            )),
            ..Default::default()
        };
        let path = store_path(identity.key());
        debug!(path = %identity, offset, length, "ranged get");
        let result = self
            .block_on(bucket.store.get_opts(&path, options))
            .map_err(classify)?;
        Ok(Box::new(BlockingStreamReader::new(
            self.runtime.clone(),
            result.into_stream(),
        )))
    }

    fn put_object(
        &self,
        identity: &ObjectIdentity,
        source: Option<&Path>,
        attrs: &PutAttributes,
    ) -> Result<(), ClientError> {
        if identity.is_directory() {
            return Err(ClientError::Fatal(format!(
                "directory markers are not supported by this backend: {identity}"
            )));
        }
        let bucket = self.bucket(identity)?;
        let body = match source {
            Some(path) => Bytes::from(std::fs::read(path).map_err(|e| {
                ClientError::Fatal(format!("reading {}: {e}", path.display()))
            })?),
            None => Bytes::new(),
        };
        debug!(
            path = %identity,
            size = body.len(),
            last_write = ?attrs.last_write_time,
            "put object"
        );
        let path = store_path(identity.key());
        let payload = PutPayload::from(body);
        let attributes = Self::put_times(attrs);
        if attributes.is_empty() || !bucket.times_in_metadata.load(Ordering::Relaxed) {
            return self
                .block_on(bucket.store.put(&path, payload))
                .map(|_| ())
                .map_err(classify);
        }

        let mut options = PutOptions::default();
        options.attributes = attributes;
        match self.block_on(bucket.store.put_opts(&path, payload.clone(), options)) {
            Ok(_) => Ok(()),
            Err(object_store::Error::NotImplemented) => {
                warn!(
                    bucket = identity.bucket(),
                    "store does not keep object attributes, times will follow the store"
                );
                bucket.times_in_metadata.store(false, Ordering::Relaxed);
                self.block_on(bucket.store.put(&path, payload))
                    .map(|_| ())
                    .map_err(classify)
            }
            Err(e) => Err(classify(e)),
        }
    }

    fn delete_object(&self, identity: &ObjectIdentity) -> Result<(), ClientError> {
        let bucket = self.bucket(identity)?;
        self.block_on(bucket.store.delete(&store_path(identity.key())))
            .map_err(classify)
    }

    fn listings_carry_put_times(&self) -> bool {
        false
    }
}
