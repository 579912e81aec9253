//! [`ObjectClient`](common::client::ObjectClient) backed by the `object_store` crate
//!
//! Each configured bucket gets its own `ObjectStore` (S3, a local directory,
//! or memory). The client owns a small tokio runtime and blocks on it, since
//! every caller of `ObjectClient` is a plain OS thread.

mod client;
mod config;
mod reader;

pub use client::{StoreClient, StoreSetupError};
pub use config::{ObjectStoreConfig, RemoteConfig};
