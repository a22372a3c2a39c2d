use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use zarrs::storage::{
    ReadableWritableListableStorage,
    storage_adapter::async_to_sync::{AsyncToSyncBlockOn, AsyncToSyncStorageAdapter},
};
use zarrs_object_store::AsyncObjectStore;

use crate::{Error, Result};

/// Region reported to S3-compatible servers that do not use regions.
const DEFAULT_REGION: &str = "us-east-1";

struct TokioBlockOn(tokio::runtime::Runtime);

impl AsyncToSyncBlockOn for TokioBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        self.0.block_on(future)
    }
}

/// A synchronous store over an S3 bucket at a custom endpoint.
pub(super) fn object_store(
    endpoint: &str,
    bucket: &str,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<ReadableWritableListableStorage> {
    let s3 = AmazonS3Builder::new()
        .with_endpoint(endpoint)
        .with_bucket_name(bucket)
        .with_access_key_id(access_key_id)
        .with_secret_access_key(secret_access_key)
        .with_region(DEFAULT_REGION)
        .with_allow_http(endpoint.starts_with("http://"))
        .build()
        .map_err(Error::wrap)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::wrap)?;
    let store = Arc::new(AsyncObjectStore::new(s3));
    Ok(Arc::new(AsyncToSyncStorageAdapter::new(
        store,
        TokioBlockOn(runtime),
    )))
}
