//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the catalog,
//! object-store and download components. Nothing in this crate reads process-wide
//! environment variables while documents are being retrieved.

use crate::constants::{env, DEFAULT_DOWNLOAD_DIR, DEFAULT_ENDPOINT_SCHEME, DEFAULT_REGION};
use crate::{ConfigError, ConfigResult};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection settings for an S3-compatible object store.
#[derive(Clone, PartialEq, Eq)]
pub struct ObjectStoreSettings {
    endpoint: String,
    access_key: String,
    secret_key: String,
    region: String,
}

impl ObjectStoreSettings {
    /// Create settings for `endpoint`.
    ///
    /// An endpoint without a scheme (`minio.internal:9000`) is treated as HTTPS.
    pub fn new(
        endpoint: &str,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> ConfigResult<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid {
                key: "object store endpoint",
                reason: "cannot be empty".into(),
            });
        }

        let endpoint = if endpoint.contains("://") {
            endpoint.to_owned()
        } else {
            format!("{DEFAULT_ENDPOINT_SCHEME}{endpoint}")
        };

        Ok(Self {
            endpoint,
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: DEFAULT_REGION.to_owned(),
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Plain HTTP is only used when the endpoint asks for it explicitly.
    pub fn allow_http(&self) -> bool {
        self.endpoint.starts_with("http://")
    }
}

impl fmt::Debug for ObjectStoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreSettings")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Retrieval configuration resolved at startup.
#[derive(Clone)]
pub struct RetrievalConfig {
    catalog_dsn: String,
    object_store: Option<ObjectStoreSettings>,
    download_dir: PathBuf,
    concurrency: NonZeroUsize,
    item_timeout: Option<Duration>,
}

impl RetrievalConfig {
    /// Create a new `RetrievalConfig`.
    ///
    /// The catalog DSN is mandatory: a process embedding the resolver cannot start without it.
    pub fn new(catalog_dsn: impl Into<String>) -> ConfigResult<Self> {
        let catalog_dsn = catalog_dsn.into();
        if catalog_dsn.trim().is_empty() {
            return Err(ConfigError::Missing(env::CATALOG_DSN[0]));
        }

        Ok(Self {
            catalog_dsn,
            object_store: None,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            concurrency: NonZeroUsize::MIN,
            item_timeout: None,
        })
    }

    pub fn with_object_store(mut self, settings: ObjectStoreSettings) -> Self {
        self.object_store = Some(settings);
        self
    }

    pub fn with_download_dir(mut self, download_dir: impl Into<PathBuf>) -> Self {
        self.download_dir = download_dir.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn catalog_dsn(&self) -> &str {
        &self.catalog_dsn
    }

    /// Object-store settings, required by every operation that touches a bucket.
    pub fn object_store(&self) -> ConfigResult<&ObjectStoreSettings> {
        self.object_store
            .as_ref()
            .ok_or(ConfigError::Missing(env::OBJECT_STORE_ENDPOINT[0]))
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn concurrency(&self) -> NonZeroUsize {
        self.concurrency
    }

    pub fn item_timeout(&self) -> Option<Duration> {
        self.item_timeout
    }

    /// Build the configuration from a key lookup, typically `std::env::var(..).ok()`.
    ///
    /// Keys are listed in [`crate::constants::env`]; blank values count as unset.
    pub fn from_env_values<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(*key))
                .map(|value| value.trim().to_owned())
                .find(|value| !value.is_empty())
        };

        let catalog_dsn =
            read(env::CATALOG_DSN).ok_or(ConfigError::Missing(env::CATALOG_DSN[0]))?;
        let mut config = Self::new(catalog_dsn)?;

        if let Some(endpoint) = read(env::OBJECT_STORE_ENDPOINT) {
            let mut settings = ObjectStoreSettings::new(
                &endpoint,
                read(env::OBJECT_STORE_ACCESS_KEY).unwrap_or_default(),
                read(env::OBJECT_STORE_SECRET_KEY).unwrap_or_default(),
            )?;
            if let Some(region) = read(env::OBJECT_STORE_REGION) {
                settings = settings.with_region(region);
            }
            config = config.with_object_store(settings);
        }

        if let Some(dir) = read(env::DOWNLOAD_DIR) {
            config = config.with_download_dir(dir);
        }

        if let Some(value) = read(env::RETRIEVAL_CONCURRENCY) {
            let concurrency = value
                .parse::<NonZeroUsize>()
                .map_err(|e| ConfigError::Invalid {
                    key: env::RETRIEVAL_CONCURRENCY[0],
                    reason: format!("'{value}': {e}"),
                })?;
            config = config.with_concurrency(concurrency);
        }

        if let Some(value) = read(env::RETRIEVAL_TIMEOUT_SECS) {
            let secs = value.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: env::RETRIEVAL_TIMEOUT_SECS[0],
                reason: format!("'{value}': {e}"),
            })?;
            config = config.with_item_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }

        Ok(config)
    }

    /// Log the resolved configuration without credentials.
    pub fn log_summary(&self) {
        tracing::info!("catalog connection string loaded");
        match &self.object_store {
            Some(settings) => tracing::info!(
                endpoint = settings.endpoint(),
                region = settings.region(),
                "object store configured"
            ),
            None => tracing::warn!("object store endpoint not configured"),
        }
        tracing::info!(
            download_dir = %self.download_dir.display(),
            concurrency = self.concurrency.get(),
            timeout_secs = self.item_timeout.map(|t| t.as_secs()),
            "retrieval settings"
        );
    }
}

impl fmt::Debug for RetrievalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalConfig")
            .field("catalog_dsn", &"<redacted>")
            .field("object_store", &self.object_store)
            .field("download_dir", &self.download_dir)
            .field("concurrency", &self.concurrency)
            .field("item_timeout", &self.item_timeout)
            .finish()
    }
}
