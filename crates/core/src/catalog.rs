//! Catalog lookups for a document's stored path.
//!
//! A document may be registered with a rendered artifact, an original (external) artifact,
//! or neither. [`CatalogResolver::resolve_path`] prefers the rendered one and only runs the
//! original-artifact query when the first lookup yields nothing usable.
//!
//! The two queries sit behind [`CatalogQueries`] so the precedence rule can be checked
//! without a database. [`SqliteCatalog`] is the SQL implementation.

use crate::constants::{ORIGINAL_PATH_QUERY, RENDERED_PATH_QUERY};
use crate::{CatalogError, CatalogResult};
use async_trait::async_trait;
use docfetch_types::DocumentId;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// The two parameterised path lookups plus a connectivity probe.
#[async_trait]
pub trait CatalogQueries: Send + Sync {
    /// Q1: path of the document's rendered artifact, if any.
    async fn rendered_path(&self, id: &DocumentId) -> CatalogResult<Option<String>>;

    /// Q2: path of the document's original artifact, if any.
    async fn original_path(&self, id: &DocumentId) -> CatalogResult<Option<String>>;

    /// Cheap round trip used at startup.
    async fn ping(&self) -> CatalogResult<()>;
}

/// Applies the rendered-over-original precedence on top of [`CatalogQueries`].
#[derive(Clone)]
pub struct CatalogResolver {
    queries: Arc<dyn CatalogQueries>,
}

impl CatalogResolver {
    pub fn new(queries: Arc<dyn CatalogQueries>) -> Self {
        Self { queries }
    }

    /// Look up the storage path string for `id`.
    ///
    /// `Ok(None)` means the document has no stored artifact; it is not an error.
    /// Null, empty and whitespace-only paths count as absent.
    pub async fn resolve_path(&self, id: &DocumentId) -> CatalogResult<Option<String>> {
        if let Some(path) = usable(self.queries.rendered_path(id).await?) {
            tracing::debug!(document_id = %id, "using rendered artifact path");
            return Ok(Some(path));
        }

        let original = usable(self.queries.original_path(id).await?);
        if original.is_some() {
            tracing::debug!(document_id = %id, "using original artifact path");
        }
        Ok(original)
    }

    pub async fn ping(&self) -> CatalogResult<()> {
        self.queries.ping().await
    }
}

fn usable(path: Option<String>) -> Option<String> {
    path.filter(|p| !p.trim().is_empty())
}

/// SQLite-backed catalog.
///
/// The connection is opened read-only. Lookups only stay clear of catalog writers when the
/// database is in WAL journal mode: a WAL reader works from the last committed snapshot and
/// never waits on, or holds up, a writer. With a rollback journal a writer committing blocks
/// readers, so a warning is logged at connect. `read_uncommitted` is set as well but only
/// takes effect for shared-cache connections. Queries run on the blocking pool.
#[derive(Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open the catalog at `dsn` (a file path or `file:` URI).
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Connection`] if the database cannot be opened or does not
    /// answer a trivial query.
    pub fn connect(dsn: &str) -> CatalogResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(Path::new(dsn), flags)
            .map_err(|e| CatalogError::Connection(Box::new(e)))?;

        Self::from_connection(conn)
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: Connection) -> CatalogResult<Self> {
        conn.execute_batch("PRAGMA read_uncommitted = true;")
            .map_err(|e| CatalogError::Connection(Box::new(e)))?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| CatalogError::Connection(Box::new(e)))?;

        let mode = journal_mode(&conn)?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(journal_mode = %mode, "catalog is not in WAL mode, lookups may wait on writers");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn query_path(&self, sql: &'static str, id: &DocumentId) -> CatalogResult<Option<String>> {
        let conn = Arc::clone(&self.conn);
        let id = id.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            conn.query_row(sql, [id.as_str()], |row| row.get::<_, Option<String>>(0))
                .optional()
                .map(Option::flatten)
                .map_err(|e| CatalogError::Query {
                    id: id.to_string(),
                    source: Box::new(e),
                })
        })
        .await
        .map_err(|e| CatalogError::Worker(e.to_string()))?
    }
}

fn journal_mode(conn: &Connection) -> CatalogResult<String> {
    conn.query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
        .map_err(|e| CatalogError::Connection(Box::new(e)))
}

#[async_trait]
impl CatalogQueries for SqliteCatalog {
    async fn rendered_path(&self, id: &DocumentId) -> CatalogResult<Option<String>> {
        self.query_path(RENDERED_PATH_QUERY, id).await
    }

    async fn original_path(&self, id: &DocumentId) -> CatalogResult<Option<String>> {
        self.query_path(ORIGINAL_PATH_QUERY, id).await
    }

    async fn ping(&self) -> CatalogResult<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|_| ())
                .map_err(|e| CatalogError::Connection(Box::new(e)))
        })
        .await
        .map_err(|e| CatalogError::Worker(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CatalogCall, RecordingCatalog};
    use tempfile::TempDir;

    fn id(value: &str) -> DocumentId {
        DocumentId::new(value).unwrap()
    }

    #[tokio::test]
    async fn rendered_path_short_circuits_original_query() {
        let catalog = RecordingCatalog::new().with_rendered("9332334", "abc|documento.renderizado");
        let resolver = CatalogResolver::new(Arc::new(catalog.clone()));

        let path = resolver.resolve_path(&id("9332334")).await.unwrap();

        assert_eq!(path.as_deref(), Some("abc|documento.renderizado"));
        assert_eq!(catalog.calls(), vec![CatalogCall::Rendered("9332334".into())]);
    }

    #[tokio::test]
    async fn null_rendered_path_falls_back_to_original() {
        let catalog = RecordingCatalog::new().with_original("77", "def|documento.externo|application/pdf|pdf");
        let resolver = CatalogResolver::new(Arc::new(catalog.clone()));

        let path = resolver.resolve_path(&id("77")).await.unwrap();

        assert_eq!(path.as_deref(), Some("def|documento.externo|application/pdf|pdf"));
        assert_eq!(
            catalog.calls(),
            vec![
                CatalogCall::Rendered("77".into()),
                CatalogCall::Original("77".into())
            ]
        );
    }

    #[tokio::test]
    async fn blank_rendered_path_counts_as_absent() {
        let catalog = RecordingCatalog::new()
            .with_rendered("5", "   ")
            .with_original("5", "ghi|documento.externo");
        let resolver = CatalogResolver::new(Arc::new(catalog));

        let path = resolver.resolve_path(&id("5")).await.unwrap();

        assert_eq!(path.as_deref(), Some("ghi|documento.externo"));
    }

    #[tokio::test]
    async fn no_artifact_is_empty_result_not_error() {
        let resolver = CatalogResolver::new(Arc::new(RecordingCatalog::new()));

        let path = resolver.resolve_path(&id("404")).await.unwrap();

        assert_eq!(path, None);
    }

    #[tokio::test]
    async fn query_failure_is_reported_distinctly() {
        let catalog = RecordingCatalog::new().failing();
        let resolver = CatalogResolver::new(Arc::new(catalog));

        let result = resolver.resolve_path(&id("1")).await;

        assert!(matches!(result, Err(CatalogError::Query { .. })));
    }

    fn seed_catalog(dir: &TempDir) -> String {
        let path = dir.path().join("catalog.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE files (id INTEGER PRIMARY KEY, path TEXT);
             CREATE TABLE documents (
                 id TEXT PRIMARY KEY,
                 rendered_file_id INTEGER REFERENCES files(id),
                 external_file_id INTEGER REFERENCES files(id)
             );
             INSERT INTO files (id, path) VALUES
                 (1, 'r-uuid|documento.renderizado|application/pdf|pdf'),
                 (2, 'o-uuid|documento.externo|application/pdf|pdf'),
                 (3, NULL),
                 (4, 'only-original|mni.documento.original');
             INSERT INTO documents (id, rendered_file_id, external_file_id) VALUES
                 ('9332334', 1, 2),
                 ('29033388', 3, 4),
                 ('100', NULL, NULL);",
        )
        .unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn sqlite_catalog_applies_precedence() {
        let dir = TempDir::new().unwrap();
        let dsn = seed_catalog(&dir);
        let catalog = SqliteCatalog::connect(&dsn).unwrap();
        let resolver = CatalogResolver::new(Arc::new(catalog));

        assert_eq!(
            resolver.resolve_path(&id("9332334")).await.unwrap().as_deref(),
            Some("r-uuid|documento.renderizado|application/pdf|pdf")
        );
        assert_eq!(
            resolver.resolve_path(&id("29033388")).await.unwrap().as_deref(),
            Some("only-original|mni.documento.original")
        );
        assert_eq!(resolver.resolve_path(&id("100")).await.unwrap(), None);
        assert_eq!(resolver.resolve_path(&id("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn sqlite_catalog_is_read_only() {
        let dir = TempDir::new().unwrap();
        let dsn = seed_catalog(&dir);
        let catalog = SqliteCatalog::connect(&dsn).unwrap();

        let conn = catalog.conn.lock().unwrap();
        let result = conn.execute("DELETE FROM documents", []);

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wal_catalog_reads_committed_path_during_open_write() {
        let dir = TempDir::new().unwrap();
        let dsn = seed_catalog(&dir);
        let writer = Connection::open(&dsn).unwrap();
        let mode: String = writer
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        writer
            .execute_batch(
                "BEGIN IMMEDIATE;
                 UPDATE files SET path = 'pending|documento.renderizado' WHERE id = 1;",
            )
            .unwrap();

        let catalog = SqliteCatalog::connect(&dsn).unwrap();
        assert_eq!(journal_mode(&catalog.conn.lock().unwrap()).unwrap(), "wal");
        let resolver = CatalogResolver::new(Arc::new(catalog));

        let path = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            resolver.resolve_path(&id("9332334")),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(
            path.as_deref(),
            Some("r-uuid|documento.renderizado|application/pdf|pdf")
        );
        writer.execute_batch("ROLLBACK;").unwrap();
    }

    #[tokio::test]
    async fn sqlite_catalog_ping() {
        let dir = TempDir::new().unwrap();
        let catalog = SqliteCatalog::connect(&seed_catalog(&dir)).unwrap();

        assert!(catalog.ping().await.is_ok());
    }

    #[test]
    fn connecting_to_missing_catalog_fails() {
        let dir = TempDir::new().unwrap();
        let dsn = dir.path().join("absent.db");

        let result = SqliteCatalog::connect(&dsn.to_string_lossy());

        assert!(matches!(result, Err(CatalogError::Connection(_))));
    }

    #[tokio::test]
    async fn query_against_wrong_schema_is_query_error() {
        let conn = Connection::open_in_memory().unwrap();
        let catalog = SqliteCatalog::from_connection(conn).unwrap();

        let result = catalog.rendered_path(&id("1")).await;

        assert!(matches!(result, Err(CatalogError::Query { .. })));
    }
}
