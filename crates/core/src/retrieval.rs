//! Single-document retrieval.
//!
//! [`DocumentRetriever`] runs the full pipeline for one identifier:
//! catalog lookup, path parsing, bucket resolution, then location and download.
//! It never returns an error. Every outcome, including failures, is folded into a
//! [`RetrievalResult`] so a batch always gets one entry per identifier.

use crate::bucket::BucketPolicy;
use crate::catalog::CatalogResolver;
use crate::descriptor::PathDescriptor;
use crate::locator::{DownloadedDocument, LocalName, ObjectLocator};
use crate::{CatalogError, RetrievalError, StorageError};
use docfetch_files::DownloadStore;
use docfetch_types::DocumentId;

/// Where the storage path of an item comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSource {
    /// Resolve through the catalog.
    Catalog,
    /// A storage path string supplied by the caller.
    Raw(String),
    Descriptor(PathDescriptor),
}

/// Failure category of a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CatalogConnection,
    MalformedPath,
    StorageAccess,
    ObjectNotFound,
    LocalStorage,
    TimedOut,
    Unexpected,
}

impl FailureKind {
    /// Whether running the same item again may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::CatalogConnection | Self::StorageAccess | Self::TimedOut
        )
    }
}

impl RetrievalError {
    pub fn kind(&self) -> FailureKind {
        match self {
            // A caller asking for catalog lookups without a catalog is a wiring bug.
            Self::Catalog(CatalogError::NotConfigured) => FailureKind::Unexpected,
            Self::Catalog(_) => FailureKind::CatalogConnection,
            Self::MalformedPath(_) => FailureKind::MalformedPath,
            Self::Storage(StorageError::NotFound { .. })
            | Self::ObjectNotFound { .. }
            | Self::ObjectVanished { .. } => FailureKind::ObjectNotFound,
            Self::Storage(_) => FailureKind::StorageAccess,
            Self::LocalStorage(_) => FailureKind::LocalStorage,
            Self::TimedOut(_) => FailureKind::TimedOut,
            Self::Unexpected(_) => FailureKind::Unexpected,
        }
    }
}

/// What happened to one identifier.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    Downloaded(DownloadedDocument),
    /// The catalog has no stored artifact for the document.
    Skipped { reason: String },
    Failed { kind: FailureKind, reason: String },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievalResult {
    pub identifier: DocumentId,
    #[serde(flatten)]
    pub outcome: RetrievalOutcome,
}

impl RetrievalResult {
    pub fn failed(identifier: DocumentId, error: &RetrievalError) -> Self {
        Self {
            identifier,
            outcome: RetrievalOutcome::Failed {
                kind: error.kind(),
                reason: error.to_string(),
            },
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self.outcome, RetrievalOutcome::Downloaded(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            RetrievalOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn local_path(&self) -> Option<&std::path::Path> {
        match &self.outcome {
            RetrievalOutcome::Downloaded(doc) => Some(&doc.file.path),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct DocumentRetriever {
    catalog: Option<CatalogResolver>,
    policy: BucketPolicy,
    locator: ObjectLocator,
    downloads: DownloadStore,
}

impl DocumentRetriever {
    /// Retriever for caller-supplied paths only. Use [`Self::with_catalog`] to resolve
    /// identifiers through the catalog.
    pub fn new(locator: ObjectLocator, downloads: DownloadStore) -> Self {
        Self {
            catalog: None,
            policy: BucketPolicy::new(),
            locator,
            downloads,
        }
    }

    pub fn with_catalog(mut self, catalog: CatalogResolver) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn catalog(&self) -> Option<&CatalogResolver> {
        self.catalog.as_ref()
    }

    /// Resolve `id` through the catalog and download its artifact.
    pub async fn retrieve(&self, id: &DocumentId, name: &LocalName) -> RetrievalResult {
        self.retrieve_from(id, &ItemSource::Catalog, name).await
    }

    pub async fn retrieve_from(
        &self,
        id: &DocumentId,
        source: &ItemSource,
        name: &LocalName,
    ) -> RetrievalResult {
        let outcome = match self.try_retrieve(id, source, name).await {
            Ok(Some(document)) => RetrievalOutcome::Downloaded(document),
            Ok(None) => {
                tracing::warn!(document_id = %id, "no stored artifact registered, skipping");
                RetrievalOutcome::Skipped {
                    reason: "no stored artifact".into(),
                }
            }
            Err(error) => {
                let kind = error.kind();
                tracing::error!(
                    document_id = %id,
                    ?kind,
                    retryable = kind.is_retryable(),
                    error = %error,
                    "retrieval failed"
                );
                return RetrievalResult::failed(id.clone(), &error);
            }
        };

        RetrievalResult {
            identifier: id.clone(),
            outcome,
        }
    }

    async fn try_retrieve(
        &self,
        id: &DocumentId,
        source: &ItemSource,
        name: &LocalName,
    ) -> Result<Option<DownloadedDocument>, RetrievalError> {
        let descriptor = match source {
            ItemSource::Catalog => {
                let catalog = self.catalog.as_ref().ok_or(CatalogError::NotConfigured)?;
                match catalog.resolve_path(id).await? {
                    Some(raw) => PathDescriptor::parse(&raw)?,
                    None => return Ok(None),
                }
            }
            ItemSource::Raw(raw) => PathDescriptor::parse(raw)?,
            ItemSource::Descriptor(descriptor) => descriptor.clone(),
        };

        let bucket = self.policy.resolve(descriptor.document_type());
        tracing::debug!(
            document_id = %id,
            bucket = %bucket,
            key = %descriptor.object_key(),
            "resolved storage location"
        );

        self.locator
            .locate_and_download(bucket.as_str(), &descriptor, &self.downloads, name)
            .await
            .map(Some)
    }
}
