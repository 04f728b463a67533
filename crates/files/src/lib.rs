//! docfetch Local Download Storage
//!
//! This crate owns the only persisted artefact of a retrieval: the downloaded file on the
//! local filesystem.
//!
//! ## Design Principles
//!
//! - The destination directory is created on demand
//! - Downloads are written under a temporary name and renamed into place, so an interrupted
//!   retrieval never leaves a truncated file under the final name
//! - Filenames derived from object keys are flattened to a single path component
//! - A cancelled write is discarded, even if it already reached its final name
//! - Every stored file is described by a [`StoredFile`] record (digest, size, media type)
//!
//! ## Layout
//!
//! ```text
//! <download_dir>/
//! ├── 9332334_1f0c…a7.pdf
//! ├── 29033388_77b2…e1.docx
//! └── .docfetch-XXXXXX.part   # only while a write is in flight
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use docfetch_files::DownloadStore;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = DownloadStore::new(Path::new("downloads"))?;
//! let stored = store.store("9332334_report.pdf", b"%PDF-1.7")?;
//! println!("{} ({} bytes)", stored.path.display(), stored.size_bytes);
//! # Ok(())
//! # }
//! ```

mod constants;
mod downloads;

pub use constants::{PART_FILE_PREFIX, PART_FILE_SUFFIX};
pub use downloads::{local_filename, DownloadStore, StoredFile, WriteCancellation};

/// Errors that can occur during local file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Destination path exists but cannot be used as a download directory
    #[error("Invalid download directory: {0}")]
    InvalidDirectory(String),

    /// Filename is empty or would escape the download directory
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// The write was cancelled before the file was moved into place
    #[error("Download cancelled: {0}")]
    Cancelled(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
