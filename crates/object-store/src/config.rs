use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which object_store backend serves the buckets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ObjectStoreConfig {
    /// S3 or an S3-compatible endpoint (MinIO, R2, ...)
    S3 {
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_key: Option<String>,
        #[serde(default)]
        secret_key: Option<String>,
        #[serde(default)]
        allow_http: bool,
    },
    /// One subdirectory of `path` per bucket
    Local { path: PathBuf },
    /// Ephemeral, process-local storage
    #[default]
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Buckets exposed at the namespace root
    pub buckets: Vec<String>,
    /// Region reported for every bucket
    pub region: String,
    /// Threads of the runtime driving object_store requests
    pub io_threads: usize,
    pub store: ObjectStoreConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
            region: "us-east-1".to_string(),
            io_threads: 2,
            store: ObjectStoreConfig::default(),
        }
    }
}
