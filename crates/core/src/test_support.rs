//! In-memory catalog and bucket doubles that record every call.

use crate::catalog::CatalogQueries;
use crate::storage::BucketStore;
use crate::{CatalogError, CatalogResult, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use docfetch_types::DocumentId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCall {
    Rendered(String),
    Original(String),
}

#[derive(Default)]
struct CatalogState {
    rendered: HashMap<String, String>,
    original: HashMap<String, String>,
    failing: bool,
    calls: Vec<CatalogCall>,
}

/// Catalog double. Clones share state and call log.
#[derive(Clone, Default)]
pub struct RecordingCatalog {
    state: Arc<Mutex<CatalogState>>,
}

impl RecordingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rendered(self, id: &str, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rendered
            .insert(id.to_owned(), path.to_owned());
        self
    }

    pub fn with_original(self, id: &str, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .original
            .insert(id.to_owned(), path.to_owned());
        self
    }

    /// Every query fails with [`CatalogError::Query`].
    pub fn failing(self) -> Self {
        self.state.lock().unwrap().failing = true;
        self
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn answer(&self, call: CatalogCall, id: &DocumentId) -> CatalogResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());
        if state.failing {
            return Err(CatalogError::Query {
                id: id.to_string(),
                source: "connection reset".into(),
            });
        }
        let table = match call {
            CatalogCall::Rendered(_) => &state.rendered,
            CatalogCall::Original(_) => &state.original,
        };
        Ok(table.get(id.as_str()).cloned())
    }
}

#[async_trait]
impl CatalogQueries for RecordingCatalog {
    async fn rendered_path(&self, id: &DocumentId) -> CatalogResult<Option<String>> {
        self.answer(CatalogCall::Rendered(id.to_string()), id)
    }

    async fn original_path(&self, id: &DocumentId) -> CatalogResult<Option<String>> {
        self.answer(CatalogCall::Original(id.to_string()), id)
    }

    async fn ping(&self) -> CatalogResult<()> {
        if self.state.lock().unwrap().failing {
            return Err(CatalogError::Connection("connection refused".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketOp {
    Exists { bucket: String, key: String },
    List { bucket: String },
    Fetch { bucket: String, key: String },
}

#[derive(Default)]
struct BucketState {
    // Keys keep insertion order so listing order is under test control.
    buckets: BTreeMap<String, Vec<(String, Bytes)>>,
    unreachable: HashSet<String>,
    ops: Vec<BucketOp>,
}

/// Bucket double with insertion-ordered listings and injectable access failures.
#[derive(Clone, Default)]
pub struct MemoryBuckets {
    state: Arc<Mutex<BucketState>>,
}

impl MemoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.to_owned())
            .or_default()
            .push((key.to_owned(), Bytes::copy_from_slice(data)));
        self
    }

    /// Every operation on `bucket` fails with [`StorageError::Access`].
    pub fn unreachable(self, bucket: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .unreachable
            .insert(bucket.to_owned());
        self
    }

    pub fn ops(&self) -> Vec<BucketOp> {
        self.state.lock().unwrap().ops.clone()
    }

    fn check(state: &BucketState, bucket: &str) -> StorageResult<()> {
        if state.unreachable.contains(bucket) {
            return Err(StorageError::access(bucket, "access denied"));
        }
        Ok(())
    }
}

#[async_trait]
impl BucketStore for MemoryBuckets {
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(BucketOp::Exists {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        });
        Self::check(&state, bucket)?;
        Ok(state
            .buckets
            .get(bucket)
            .is_some_and(|objects| objects.iter().any(|(k, _)| k == key)))
    }

    async fn list_keys(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(BucketOp::List {
            bucket: bucket.to_owned(),
        });
        Self::check(&state, bucket)?;
        let prefix = prefix.unwrap_or_default();
        Ok(state
            .buckets
            .get(bucket)
            .map(|objects| {
                objects
                    .iter()
                    .map(|(k, _)| k.clone())
                    .filter(|k| k.starts_with(prefix))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(BucketOp::Fetch {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        });
        Self::check(&state, bucket)?;
        state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.iter().find(|(k, _)| k == key))
            .map(|(_, data)| data.clone())
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            })
    }

    async fn list_buckets(&self) -> StorageResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .buckets
            .keys()
            .filter(|bucket| !state.unreachable.contains(*bucket))
            .cloned()
            .collect())
    }
}
