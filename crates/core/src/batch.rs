//! Batch retrieval.
//!
//! Items are retrieved independently: a failure on one never stops the others, and the
//! report always holds exactly one result per input item, in input order. Each item runs
//! as its own task, so a panic while retrieving it becomes an `unexpected` failure for that
//! item only. Local files are named `<identifier>_<object key>`.

use crate::descriptor::PathDescriptor;
use crate::locator::LocalName;
use crate::retrieval::{DocumentRetriever, ItemSource, RetrievalOutcome, RetrievalResult};
use crate::RetrievalError;
use docfetch_types::DocumentId;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::num::NonZeroUsize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub identifier: DocumentId,
    pub source: ItemSource,
}

impl BatchItem {
    /// Item resolved through the catalog.
    pub fn catalog(identifier: DocumentId) -> Self {
        Self {
            identifier,
            source: ItemSource::Catalog,
        }
    }

    pub fn raw(identifier: DocumentId, path: impl Into<String>) -> Self {
        Self {
            identifier,
            source: ItemSource::Raw(path.into()),
        }
    }

    pub fn descriptor(identifier: DocumentId, descriptor: PathDescriptor) -> Self {
        Self {
            identifier,
            source: ItemSource::Descriptor(descriptor),
        }
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<RetrievalResult>,
}

impl BatchReport {
    pub fn from_results(results: Vec<RetrievalResult>) -> Self {
        let mut report = Self {
            total: results.len(),
            downloaded: 0,
            skipped: 0,
            failed: 0,
            results: Vec::new(),
        };
        for result in &results {
            match result.outcome {
                RetrievalOutcome::Downloaded(_) => report.downloaded += 1,
                RetrievalOutcome::Skipped { .. } => report.skipped += 1,
                RetrievalOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report.results = results;
        report
    }

    /// Identifiers of failed items whose failure may clear on a later run.
    pub fn retryable(&self) -> impl Iterator<Item = &DocumentId> {
        self.results
            .iter()
            .filter(|r| r.failure_kind().is_some_and(|kind| kind.is_retryable()))
            .map(|r| &r.identifier)
    }
}

pub struct BatchOrchestrator {
    retriever: DocumentRetriever,
    concurrency: NonZeroUsize,
    item_timeout: Option<Duration>,
}

impl BatchOrchestrator {
    /// Sequential orchestrator without a per-item deadline.
    pub fn new(retriever: DocumentRetriever) -> Self {
        Self {
            retriever,
            concurrency: NonZeroUsize::MIN,
            item_timeout: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    /// Retrieve every item, with up to `concurrency` items in flight.
    pub async fn retrieve_all(&self, items: Vec<BatchItem>) -> BatchReport {
        tracing::info!(
            items = items.len(),
            concurrency = self.concurrency.get(),
            "starting batch retrieval"
        );

        let results: Vec<RetrievalResult> = stream::iter(items)
            .map(|item| self.run_item(item))
            .buffered(self.concurrency.get())
            .collect()
            .await;

        let report = BatchReport::from_results(results);
        tracing::info!(
            total = report.total,
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed,
            "batch retrieval finished"
        );
        report
    }

    fn run_item(&self, item: BatchItem) -> impl Future<Output = RetrievalResult> {
        let retriever = self.retriever.clone();
        let timeout = self.item_timeout;
        let identifier = item.identifier.clone();

        let task = tokio::spawn(async move {
            let name = LocalName::Prefixed(item.identifier.to_string());
            let work = retriever.retrieve_from(&item.identifier, &item.source, &name);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => {
                        let error = RetrievalError::TimedOut(limit);
                        tracing::error!(document_id = %item.identifier, error = %error, "retrieval failed");
                        RetrievalResult::failed(item.identifier.clone(), &error)
                    }
                },
                None => work.await,
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    let error = RetrievalError::Unexpected(join_error.to_string());
                    tracing::error!(document_id = %identifier, error = %error, "retrieval task aborted");
                    RetrievalResult::failed(identifier, &error)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogResolver;
    use crate::locator::ObjectLocator;
    use crate::retrieval::FailureKind;
    use crate::storage::BucketStore;
    use crate::test_support::{MemoryBuckets, RecordingCatalog};
    use crate::StorageResult;
    use async_trait::async_trait;
    use bytes::Bytes;
    use docfetch_files::DownloadStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn id(value: &str) -> DocumentId {
        DocumentId::new(value).unwrap()
    }

    fn orchestrator(tmp: &TempDir, store: Arc<dyn BucketStore>) -> BatchOrchestrator {
        let catalog = RecordingCatalog::new()
            .with_rendered("1", "aaa|documento.externo|application/pdf|pdf")
            .with_rendered("2", "bbb|documento.externo|application/pdf|pdf")
            .with_original("3", "ccc|documento.externo|application/pdf|pdf");
        let retriever = DocumentRetriever::new(
            ObjectLocator::new(store),
            DownloadStore::new(tmp.path()).unwrap(),
        )
        .with_catalog(CatalogResolver::new(Arc::new(catalog)));
        BatchOrchestrator::new(retriever)
    }

    fn bucket_without_bbb() -> Arc<dyn BucketStore> {
        Arc::new(
            MemoryBuckets::new()
                .with_object("gampes-documento-externo", "aaa.pdf", b"%PDF a")
                .with_object("gampes-documento-externo", "ccc.pdf", b"%PDF c"),
        )
    }

    fn catalog_items(ids: &[&str]) -> Vec<BatchItem> {
        ids.iter().map(|v| BatchItem::catalog(id(v))).collect()
    }

    #[tokio::test]
    async fn failure_in_middle_does_not_affect_neighbours() {
        let tmp = TempDir::new().unwrap();
        let orchestrator = orchestrator(&tmp, bucket_without_bbb());

        let report = orchestrator.retrieve_all(catalog_items(&["1", "2", "3"])).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.results.len(), 3);
        assert!(report.results[0].is_downloaded());
        assert_eq!(
            report.results[1].failure_kind(),
            Some(FailureKind::ObjectNotFound)
        );
        assert!(report.results[2].is_downloaded());
        assert_eq!((report.downloaded, report.failed), (2, 1));

        assert_eq!(std::fs::read(tmp.path().join("1_aaa.pdf")).unwrap(), b"%PDF a");
        assert_eq!(std::fs::read(tmp.path().join("3_ccc.pdf")).unwrap(), b"%PDF c");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_batch_keeps_input_order() {
        let tmp = TempDir::new().unwrap();
        let orchestrator =
            orchestrator(&tmp, bucket_without_bbb()).with_concurrency(NonZeroUsize::new(3).unwrap());

        let report = orchestrator
            .retrieve_all(catalog_items(&["3", "2", "1", "404"]))
            .await;

        let ids: Vec<_> = report.results.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1", "404"]);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn same_uuid_from_different_rows_does_not_collide() {
        let tmp = TempDir::new().unwrap();
        let orchestrator = orchestrator(&tmp, bucket_without_bbb());

        let report = orchestrator
            .retrieve_all(vec![
                BatchItem::raw(id("10"), "aaa|documento.externo|application/pdf|pdf"),
                BatchItem::raw(id("11"), "aaa|documento.externo|application/pdf|pdf"),
            ])
            .await;

        assert_eq!(report.downloaded, 2);
        assert!(tmp.path().join("10_aaa.pdf").exists());
        assert!(tmp.path().join("11_aaa.pdf").exists());
    }

    struct StallingStore;

    #[async_trait]
    impl BucketStore for StallingStore {
        async fn exists(&self, _bucket: &str, _key: &str) -> StorageResult<bool> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }

        async fn list_keys(&self, _bucket: &str, _prefix: Option<&str>) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn fetch(&self, _bucket: &str, _key: &str) -> StorageResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn list_buckets(&self) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_item_times_out() {
        let tmp = TempDir::new().unwrap();
        let orchestrator = orchestrator(&tmp, Arc::new(StallingStore))
            .with_item_timeout(Some(Duration::from_secs(5)));

        let report = orchestrator.retrieve_all(catalog_items(&["1"])).await;

        assert_eq!(report.results[0].failure_kind(), Some(FailureKind::TimedOut));
        assert_eq!(report.retryable().count(), 1);
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    /// Serves one large object for every key.
    struct LargeObjectStore(Bytes);

    #[async_trait]
    impl BucketStore for LargeObjectStore {
        async fn exists(&self, _bucket: &str, _key: &str) -> StorageResult<bool> {
            Ok(true)
        }

        async fn list_keys(&self, _bucket: &str, _prefix: Option<&str>) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn fetch(&self, _bucket: &str, _key: &str) -> StorageResult<Bytes> {
            Ok(self.0.clone())
        }

        async fn list_buckets(&self) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timeout_during_write_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let payload = Bytes::from(vec![0x25u8; 64 * 1024 * 1024]);
        let orchestrator = orchestrator(&tmp, Arc::new(LargeObjectStore(payload)))
            .with_item_timeout(Some(Duration::from_millis(1)));

        let report = orchestrator.retrieve_all(catalog_items(&["1"])).await;
        assert_eq!(report.results[0].failure_kind(), Some(FailureKind::TimedOut));

        // The blocking writer outlives the timeout; wait for it to drop its part file.
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while std::fs::read_dir(tmp.path()).unwrap().next().is_some()
            && std::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!tmp.path().join("1_aaa.pdf").exists());
        assert!(std::fs::read_dir(tmp.path()).unwrap().next().is_none());
    }

    struct PanickingStore;

    #[async_trait]
    impl BucketStore for PanickingStore {
        async fn exists(&self, _bucket: &str, _key: &str) -> StorageResult<bool> {
            panic!("store exploded");
        }

        async fn list_keys(&self, _bucket: &str, _prefix: Option<&str>) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn fetch(&self, _bucket: &str, _key: &str) -> StorageResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn list_buckets(&self) -> StorageResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn panic_is_contained_to_its_item() {
        let tmp = TempDir::new().unwrap();
        let orchestrator = orchestrator(&tmp, Arc::new(PanickingStore));

        let report = orchestrator
            .retrieve_all(vec![
                BatchItem::catalog(id("1")),
                BatchItem::raw(id("2"), "broken"),
            ])
            .await;

        assert_eq!(
            report.results[0].failure_kind(),
            Some(FailureKind::Unexpected)
        );
        assert_eq!(
            report.results[1].failure_kind(),
            Some(FailureKind::MalformedPath)
        );
    }

    #[test]
    fn report_serializes_counts_and_results() {
        let report = BatchReport::from_results(vec![RetrievalResult::failed(
            id("9"),
            &RetrievalError::TimedOut(Duration::from_secs(1)),
        )]);

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["total"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"][0]["kind"], "timed_out");
    }
}
