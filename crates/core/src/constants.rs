//! Constants used throughout the docfetch core crate.
//!
//! Catalog SQL, bucket naming tokens, fallback probe suffixes and configuration keys live
//! here so they stay consistent across modules.

/// Delimiter between the fields of a stored path string (`uuid|type|mime|ext`).
pub const PATH_FIELD_DELIMITER: char = '|';

/// Minimum number of fields a stored path string must carry (uuid and document type).
pub const MIN_PATH_FIELDS: usize = 2;

/// Index of the extension field in a stored path string.
pub const EXTENSION_FIELD_INDEX: usize = 3;

/// Namespace token prefixed to buckets derived for unmapped document types.
pub const BUCKET_NAMESPACE: &str = "gampes";

/// Suffixes probed, in order, after the uuid when the derived key is missing.
pub const FALLBACK_SUFFIXES: [&str; 5] = ["", ".pdf", ".PDF", ".doc", ".docx"];

/// Default directory for downloads when none is configured.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Region sent to S3-compatible endpoints that do not care about regions (MinIO).
pub const DEFAULT_REGION: &str = "us-east-1";

/// Scheme assumed for object-store endpoints configured without one.
pub const DEFAULT_ENDPOINT_SCHEME: &str = "https://";

/// Rendered-artifact lookup (Q1). Single identifier parameter, zero or one row.
pub const RENDERED_PATH_QUERY: &str = "SELECT f.path
     FROM documents d
     LEFT JOIN files f ON f.id = d.rendered_file_id
     WHERE d.id = ?1";

/// Original-artifact lookup (Q2). Single identifier parameter, zero or one row.
pub const ORIGINAL_PATH_QUERY: &str = "SELECT f.path
     FROM documents d
     LEFT JOIN files f ON f.id = d.external_file_id
     WHERE d.id = ?1";

/// Environment keys read by [`crate::config::RetrievalConfig::from_env_values`].
///
/// Each setting lists its primary key first, followed by accepted legacy aliases.
pub mod env {
    pub const CATALOG_DSN: &[&str] = &["CATALOG_DSN", "SQL_SERVER_CNXN_STR"];
    pub const OBJECT_STORE_ENDPOINT: &[&str] = &["OBJECT_STORE_ENDPOINT", "MINIO_ENDPOINT"];
    pub const OBJECT_STORE_ACCESS_KEY: &[&str] = &["OBJECT_STORE_ACCESS_KEY", "MINIO_ACCESS_KEY"];
    pub const OBJECT_STORE_SECRET_KEY: &[&str] = &["OBJECT_STORE_SECRET_KEY", "MINIO_SECRET_KEY"];
    pub const OBJECT_STORE_REGION: &[&str] = &["OBJECT_STORE_REGION"];
    pub const DOWNLOAD_DIR: &[&str] = &["DOWNLOAD_DIR"];
    pub const RETRIEVAL_CONCURRENCY: &[&str] = &["RETRIEVAL_CONCURRENCY"];
    pub const RETRIEVAL_TIMEOUT_SECS: &[&str] = &["RETRIEVAL_TIMEOUT_SECS"];
}
