//! Object-store access, one bucket at a time.
//!
//! [`BucketStore`] is the seam the locator talks to: existence probes, key listings,
//! downloads and bucket discovery. [`ObjectStoreBuckets`] implements it on top of the
//! `object_store` crate, keeping one client per bucket and sharing it across workers.
//!
//! ## Not found vs. access failures
//!
//! A missing object is a normal answer (`exists` returns `false`, `fetch` returns
//! [`StorageError::NotFound`]). Network, credential and missing-bucket failures are
//! [`StorageError::Access`] and are never folded into "not found".

use crate::bucket::BucketPolicy;
use crate::config::ObjectStoreSettings;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Operations the locator needs from an object store.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Metadata-only existence probe.
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    /// Keys in `bucket`, in the store's listing order, optionally restricted to keys that
    /// start with `prefix`.
    async fn list_keys(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>>;

    /// Full object content.
    async fn fetch(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    /// Buckets this store can reach.
    async fn list_buckets(&self) -> StorageResult<Vec<String>>;
}

enum ClientSource {
    S3(ObjectStoreSettings),
    Fixed,
}

/// [`BucketStore`] backed by `object_store` clients.
pub struct ObjectStoreBuckets {
    source: ClientSource,
    clients: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl ObjectStoreBuckets {
    /// S3-compatible (MinIO) backend. Clients are created lazily per bucket.
    pub fn s3(settings: ObjectStoreSettings) -> Self {
        Self {
            source: ClientSource::S3(settings),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Backend over pre-built stores, one per bucket name.
    ///
    /// Buckets not listed are reported as [`StorageError::UnknownBucket`].
    pub fn with_stores<I, S>(stores: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn ObjectStore>)>,
        S: Into<String>,
    {
        Self {
            source: ClientSource::Fixed,
            clients: Mutex::new(
                stores
                    .into_iter()
                    .map(|(bucket, store)| (bucket.into(), store))
                    .collect(),
            ),
        }
    }

    fn client(&self, bucket: &str) -> StorageResult<Arc<dyn ObjectStore>> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(bucket) {
            return Ok(Arc::clone(client));
        }

        let settings = match &self.source {
            ClientSource::S3(settings) => settings,
            ClientSource::Fixed => return Err(StorageError::UnknownBucket(bucket.to_owned())),
        };

        let client: Arc<dyn ObjectStore> = Arc::new(
            AmazonS3Builder::new()
                .with_endpoint(settings.endpoint())
                .with_access_key_id(settings.access_key())
                .with_secret_access_key(settings.secret_key())
                .with_region(settings.region())
                .with_bucket_name(bucket)
                .with_allow_http(settings.allow_http())
                .with_virtual_hosted_style_request(false)
                .build()
                .map_err(|e| StorageError::Configuration(e.to_string()))?,
        );

        clients.insert(bucket.to_owned(), Arc::clone(&client));
        Ok(client)
    }

    fn opened_buckets(&self) -> Vec<String> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// Parse keys that came back from a listing, fall back to encoding user-derived ones.
fn object_path(key: &str) -> ObjectPath {
    ObjectPath::parse(key).unwrap_or_else(|_| ObjectPath::from(key))
}

#[async_trait]
impl BucketStore for ObjectStoreBuckets {
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let client = self.client(bucket)?;
        match client.head(&object_path(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::access(bucket, e)),
        }
    }

    async fn list_keys(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let client = self.client(bucket)?;
        let prefix = prefix.unwrap_or_default();

        // `object_store` prefixes match whole path segments, key prefixes are plain strings.
        client
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_filter(|key| futures::future::ready(key.starts_with(prefix)))
            .try_collect()
            .await
            .map_err(|e| StorageError::access(bucket, e))
    }

    async fn fetch(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let client = self.client(bucket)?;
        let result = match client.get(&object_path(key)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound {
                    bucket: bucket.to_owned(),
                    key: key.to_owned(),
                })
            }
            Err(e) => return Err(StorageError::access(bucket, e)),
        };

        result
            .bytes()
            .await
            .map_err(|e| StorageError::access(bucket, e))
    }

    /// `object_store` has no list-buckets call, so the buckets of the policy table and any
    /// already opened bucket are probed and the reachable ones returned, sorted by name.
    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let mut candidates: BTreeSet<String> = self.opened_buckets().into_iter().collect();
        if matches!(self.source, ClientSource::S3(_)) {
            candidates.extend(BucketPolicy::new().known_buckets().map(str::to_owned));
        }

        let mut reachable = Vec::new();
        for bucket in candidates {
            let client = self.client(&bucket)?;
            let probe = client.list(None).next().await;
            match probe {
                None | Some(Ok(_)) => reachable.push(bucket),
                Some(Err(e)) => {
                    tracing::debug!(bucket = %bucket, error = %e, "bucket not reachable");
                }
            }
        }

        Ok(reachable)
    }
}
