//! Download directory service implementation
//!
//! [`DownloadStore`] is bound to a single destination directory and writes retrieved
//! documents into it.
//!
//! # Write Protocol
//!
//! 1. The bytes are written to a uniquely named `.docfetch-*.part` file in the destination
//!    directory (same filesystem, so the final step is a rename).
//! 2. The part file is flushed to disk.
//! 3. The part file is atomically renamed over `<directory>/<filename>`.
//!
//! If anything fails before step 3, the part file is removed when its handle is dropped and
//! no file appears under the final name. An existing file with the same name is replaced,
//! which makes repeated retrievals idempotent.
//!
//! # Cancellation
//!
//! [`DownloadStore::store_cancellable`] takes a [`WriteCancellation`]. The rename and the
//! cancellation check happen under one lock: a write cancelled before step 3 is discarded,
//! and a write cancelled after step 3 but before [`WriteCancellation::complete`] has its
//! final file removed again.

use crate::constants::{PART_FILE_PREFIX, PART_FILE_SUFFIX};
use crate::FilesError;
use chrono::{DateTime, Utc};
use docfetch_types::NonEmptyText;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Record of a file written by [`DownloadStore::store`]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoredFile {
    /// Final location of the file on disk
    pub path: PathBuf,

    /// Filename within the download directory
    pub filename: NonEmptyText,

    /// Hexadecimal SHA-256 digest of the file content
    pub sha256: String,

    /// Size of the file in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type), if available
    ///
    /// Best-effort detection from magic bytes; `None` when the content is not recognised.
    pub media_type: Option<NonEmptyText>,

    /// UTC timestamp when the file was stored
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: bool,
    completed: bool,
    persisted: Option<PathBuf>,
}

/// Shared cancellation flag for a single write
///
/// Clones share state. Typically one clone is moved into the blocking writer and the other
/// is cancelled when the caller gives up on the write.
#[derive(Debug, Clone, Default)]
pub struct WriteCancellation {
    state: Arc<Mutex<CancelState>>,
}

impl WriteCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the write
    ///
    /// Has no effect once [`Self::complete`] was called. If the file was already moved into
    /// place it is removed.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.completed {
            return;
        }
        state.cancelled = true;
        if let Some(path) = state.persisted.take() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to discard cancelled download");
            }
        }
    }

    /// Marks the write as handed over to the caller; later cancellation keeps the file
    pub fn complete(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .completed = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancelled
    }
}

/// Service writing downloads into one destination directory
#[derive(Debug, Clone)]
pub struct DownloadStore {
    directory: PathBuf,
}

impl DownloadStore {
    /// Creates a store for `directory`, creating the directory (and parents) if absent.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - The path exists but is not a directory
    /// - Directory creation fails (I/O)
    pub fn new(directory: &Path) -> Result<Self, FilesError> {
        if directory.exists() && !directory.is_dir() {
            return Err(FilesError::InvalidDirectory(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        fs::create_dir_all(directory).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create download directory {}: {}",
                    directory.display(),
                    e
                ),
            ))
        })?;

        Ok(Self {
            directory: directory.to_path_buf(),
        })
    }

    /// Returns the destination directory
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the path a file named `filename` would be stored at
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidFilename`] if the name cannot be used (see [`local_filename`]).
    pub fn target_path(&self, filename: &str) -> Result<PathBuf, FilesError> {
        let filename = local_filename(filename)?;
        Ok(self.directory.join(filename.as_str()))
    }

    /// Writes `contents` to `<directory>/<filename>` using the temp-then-rename protocol
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - The filename is invalid
    /// - The part file cannot be created, written or synced (I/O)
    /// - The rename into place fails (I/O)
    pub fn store(&self, filename: &str, contents: &[u8]) -> Result<StoredFile, FilesError> {
        self.store_cancellable(filename, contents, &WriteCancellation::new())
    }

    /// Like [`Self::store`], but gives up when `cancellation` is cancelled
    ///
    /// # Errors
    ///
    /// As [`Self::store`], plus [`FilesError::Cancelled`] when the write was cancelled before
    /// the file was moved into place.
    pub fn store_cancellable(
        &self,
        filename: &str,
        contents: &[u8],
        cancellation: &WriteCancellation,
    ) -> Result<StoredFile, FilesError> {
        let filename = local_filename(filename)?;
        let target = self.directory.join(filename.as_str());

        // The directory may have been removed since construction.
        fs::create_dir_all(&self.directory)?;

        let mut part = tempfile::Builder::new()
            .prefix(PART_FILE_PREFIX)
            .suffix(PART_FILE_SUFFIX)
            .tempfile_in(&self.directory)
            .map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create part file in {}: {}",
                        self.directory.display(),
                        e
                    ),
                ))
            })?;

        part.write_all(contents)?;
        part.as_file().sync_all()?;

        {
            let mut state = cancellation
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if state.cancelled {
                return Err(FilesError::Cancelled(target.display().to_string()));
            }

            part.persist(&target).map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.error.kind(),
                    format!("Failed to move download into {}: {}", target.display(), e.error),
                ))
            })?;
            state.persisted = Some(target.clone());
        }

        let digest = Sha256::digest(contents);
        let media_type = infer::get(contents)
            .and_then(|kind| NonEmptyText::new(kind.mime_type()).ok());

        Ok(StoredFile {
            path: target,
            filename,
            sha256: hex::encode(digest),
            size_bytes: contents.len() as u64,
            media_type,
            stored_at: Utc::now(),
        })
    }
}

/// Flattens a candidate filename into a single safe path component
///
/// Object keys may contain `/` (pseudo-directories); these and `\` become `_` so that the
/// file always lands directly inside the download directory.
///
/// # Errors
///
/// Returns [`FilesError::InvalidFilename`] for empty names and for `.` / `..`.
pub fn local_filename(candidate: &str) -> Result<NonEmptyText, FilesError> {
    let flattened: String = candidate
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();

    let name = NonEmptyText::new(&flattened)
        .map_err(|_| FilesError::InvalidFilename(format!("'{}' is empty", candidate)))?;

    if matches!(name.as_str(), "." | "..") {
        return Err(FilesError::InvalidFilename(format!(
            "'{}' is not a file name",
            candidate
        )));
    }

    Ok(name)
}
