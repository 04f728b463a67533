//! Object lookup with fallback search, and download.
//!
//! The key derived from a catalog path is not always the key the object was stored under.
//! Older uploads dropped the extension, changed its case or wrapped the uuid in a longer
//! name. [`ObjectLocator::locate`] tries, in order:
//!
//! 1. the derived key, with a metadata-only probe;
//! 2. the bare uuid and the uuid with each of the [`FALLBACK_SUFFIXES`], checked against a
//!    full listing of the bucket;
//! 3. the first listed key containing the uuid.
//!
//! Step 3 depends on the store's listing order when several keys contain the uuid.

use crate::constants::FALLBACK_SUFFIXES;
use crate::descriptor::PathDescriptor;
use crate::storage::BucketStore;
use crate::RetrievalError;
use docfetch_files::{DownloadStore, StoredFile, WriteCancellation};
use std::sync::Arc;

/// How the object key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupPath {
    Direct,
    Candidate,
    Substring,
}

/// Name given to the local copy of a downloaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalName {
    /// The resolved object key.
    Key,
    /// `<prefix>_<resolved key>`, so equal keys from different documents don't collide.
    Prefixed(String),
    /// A caller-chosen name, kept even when the resolved key has another extension.
    Exact(String),
}

impl LocalName {
    pub fn filename(&self, resolved_key: &str) -> String {
        match self {
            Self::Key => resolved_key.to_owned(),
            Self::Prefixed(prefix) => format!("{prefix}_{resolved_key}"),
            Self::Exact(name) => name.clone(),
        }
    }
}

/// An object found in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LocatedObject {
    pub bucket: String,
    pub key: String,
    pub lookup: LookupPath,
}

/// A located object and its local copy.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadedDocument {
    pub bucket: String,
    pub object_key: String,
    pub lookup: LookupPath,
    pub file: StoredFile,
}

#[derive(Clone)]
pub struct ObjectLocator {
    store: Arc<dyn BucketStore>,
}

impl ObjectLocator {
    pub fn new(store: Arc<dyn BucketStore>) -> Self {
        Self { store }
    }

    /// Find the object for `descriptor` in `bucket`.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::ObjectNotFound`] when neither the derived key nor any fallback
    ///   matches.
    /// - [`RetrievalError::Storage`] when the store cannot be reached; this is never reported
    ///   as a miss.
    pub async fn locate(
        &self,
        bucket: &str,
        descriptor: &PathDescriptor,
    ) -> Result<LocatedObject, RetrievalError> {
        let key = descriptor.object_key();
        let uuid = descriptor.uuid();

        if self.store.exists(bucket, &key).await? {
            return Ok(LocatedObject {
                bucket: bucket.to_owned(),
                key,
                lookup: LookupPath::Direct,
            });
        }

        tracing::debug!(bucket, key = %key, "object not found, searching bucket listing");
        let listing = self.store.list_keys(bucket, None).await?;

        let candidate = FALLBACK_SUFFIXES
            .iter()
            .map(|suffix| format!("{uuid}{suffix}"))
            .find(|candidate| listing.iter().any(|listed| listed == candidate));
        if let Some(found) = candidate {
            tracing::info!(bucket, requested = %key, found = %found, "matched fallback candidate");
            return Ok(LocatedObject {
                bucket: bucket.to_owned(),
                key: found,
                lookup: LookupPath::Candidate,
            });
        }

        if let Some(found) = listing.into_iter().find(|listed| listed.contains(uuid)) {
            tracing::info!(bucket, requested = %key, found = %found, "matched uuid substring");
            return Ok(LocatedObject {
                bucket: bucket.to_owned(),
                key: found,
                lookup: LookupPath::Substring,
            });
        }

        Err(RetrievalError::ObjectNotFound {
            bucket: bucket.to_owned(),
            uuid: uuid.to_owned(),
        })
    }

    /// Locate the object and write it into `downloads`.
    ///
    /// Dropping the returned future (a timeout, for instance) cancels the local write: no
    /// file is left under the final name, even if the blocking writer already renamed it.
    pub async fn locate_and_download(
        &self,
        bucket: &str,
        descriptor: &PathDescriptor,
        downloads: &DownloadStore,
        name: &LocalName,
    ) -> Result<DownloadedDocument, RetrievalError> {
        let located = self.locate(bucket, descriptor).await?;
        let filename = name.filename(&located.key);

        tracing::info!(bucket, key = %located.key, filename = %filename, "downloading object");
        let contents = self.store.fetch(bucket, &located.key).await?;

        let downloads = downloads.clone();
        let cancellation = WriteCancellation::new();
        let guard = CancelOnDrop(cancellation.clone());
        let file = tokio::task::spawn_blocking(move || {
            downloads.store_cancellable(&filename, &contents, &cancellation)
        })
        .await
        .map_err(|e| RetrievalError::Unexpected(format!("download writer failed: {e}")))??;
        guard.complete();

        tracing::info!(
            bucket,
            key = %located.key,
            path = %file.path.display(),
            size_bytes = file.size_bytes,
            "download complete"
        );

        Ok(DownloadedDocument {
            bucket: located.bucket,
            object_key: located.key,
            lookup: located.lookup,
            file,
        })
    }
}

/// Cancels the write unless [`CancelOnDrop::complete`] is reached.
struct CancelOnDrop(WriteCancellation);

impl CancelOnDrop {
    fn complete(self) {
        self.0.complete();
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        // No-op after complete().
        self.0.cancel();
    }
}
