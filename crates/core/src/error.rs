use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to connect to catalog: {0}")]
    Connection(#[source] BoxError),
    #[error("catalog query failed for document {id}: {source}")]
    Query {
        id: String,
        #[source]
        source: BoxError,
    },
    #[error("catalog worker failed: {0}")]
    Worker(String),
    #[error("no catalog configured")]
    NotConfigured,
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("malformed storage path '{raw}': expected at least 2 '|'-delimited fields, found {fields}")]
    TooFewFields { raw: String, fields: usize },
    #[error("malformed storage path '{raw}': {field} field is empty")]
    EmptyField { raw: String, field: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object store access failed for bucket {bucket}: {source}")]
    Access {
        bucket: String,
        #[source]
        source: BoxError,
    },
    #[error("object {key} not found in bucket {bucket}")]
    NotFound { bucket: String, key: String },
    #[error("bucket {0} is not configured")]
    UnknownBucket(String),
    #[error("invalid object store configuration: {0}")]
    Configuration(String),
}

impl StorageError {
    pub(crate) fn access(bucket: &str, source: impl Into<BoxError>) -> Self {
        Self::Access {
            bucket: bucket.to_owned(),
            source: source.into(),
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failure of a single document's retrieval.
///
/// Every variant maps onto a [`crate::FailureKind`] so batch callers can tell retryable
/// failures from terminal ones without matching on messages.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    MalformedPath(#[from] PathError),
    #[error(transparent)]
    Storage(StorageError),
    #[error("no object matching uuid {uuid} in bucket {bucket}")]
    ObjectNotFound { bucket: String, uuid: String },
    /// A located key that was gone by the time it was fetched.
    #[error("object {key} disappeared from bucket {bucket}")]
    ObjectVanished { bucket: String, key: String },
    #[error("failed to store download locally: {0}")]
    LocalStorage(#[from] docfetch_files::FilesError),
    #[error("retrieval timed out after {0:?}")]
    TimedOut(Duration),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl From<StorageError> for RetrievalError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { bucket, key } => Self::ObjectVanished { bucket, key },
            other => Self::Storage(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to prepare download directory: {0}")]
    Downloads(#[from] docfetch_files::FilesError),
}
