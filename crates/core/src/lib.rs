//! # docfetch Core
//!
//! Locates stored documents and downloads them.
//!
//! A document identifier is resolved in four steps:
//! - the catalog yields a storage path string (rendered artifact first, then original)
//! - the path string is parsed into a [`PathDescriptor`] (uuid, document type, extension)
//! - the document type selects a bucket through the [`BucketPolicy`]
//! - the [`ObjectLocator`] finds the object, falling back to a listing search, and
//!   downloads it
//!
//! [`BatchOrchestrator`] repeats this for many identifiers, isolating failures per item.
//!
//! **No process concerns**: reading the environment, logging setup and argument parsing
//! belong in the binaries. Configuration arrives here as a [`RetrievalConfig`].

pub mod batch;
pub mod bucket;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod descriptor;
mod error;
pub mod locator;
pub mod retrieval;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{BatchItem, BatchOrchestrator, BatchReport};
pub use bucket::{BucketName, BucketPolicy};
pub use catalog::{CatalogQueries, CatalogResolver, SqliteCatalog};
pub use config::{ObjectStoreSettings, RetrievalConfig};
pub use descriptor::PathDescriptor;
pub use error::{
    CatalogError, CatalogResult, ConfigError, ConfigResult, PathError, RetrievalError,
    StartupError, StorageError, StorageResult,
};
pub use locator::{DownloadedDocument, LocalName, LocatedObject, LookupPath, ObjectLocator};
pub use retrieval::{
    DocumentRetriever, FailureKind, ItemSource, RetrievalOutcome, RetrievalResult,
};
pub use storage::{BucketStore, ObjectStoreBuckets};

use docfetch_files::DownloadStore;
use std::sync::Arc;

/// Object-store backend for `config`.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] when no object-store endpoint is configured.
pub fn connect_buckets(config: &RetrievalConfig) -> ConfigResult<Arc<dyn BucketStore>> {
    let settings = config.object_store()?.clone();
    Ok(Arc::new(ObjectStoreBuckets::s3(settings)))
}

/// Connect the catalog and object store described by `config`.
///
/// Only the catalog connection is verified here. A batch cannot do anything useful without
/// it, while object-store failures are reported per document.
///
/// # Errors
///
/// Returns [`StartupError`] if the object store is not configured, the catalog cannot be
/// reached or the download directory cannot be created.
pub async fn build_retriever(config: &RetrievalConfig) -> Result<DocumentRetriever, StartupError> {
    let buckets = connect_buckets(config)?;
    let downloads = DownloadStore::new(config.download_dir())?;

    let catalog = SqliteCatalog::connect(config.catalog_dsn())?;
    let catalog = CatalogResolver::new(Arc::new(catalog));
    catalog.ping().await?;
    tracing::info!("catalog connection established");

    Ok(DocumentRetriever::new(ObjectLocator::new(buckets), downloads).with_catalog(catalog))
}

/// [`BatchOrchestrator`] with the concurrency and timeout from `config`.
pub fn batch_orchestrator(config: &RetrievalConfig, retriever: DocumentRetriever) -> BatchOrchestrator {
    BatchOrchestrator::new(retriever)
        .with_concurrency(config.concurrency())
        .with_item_timeout(config.item_timeout())
}
