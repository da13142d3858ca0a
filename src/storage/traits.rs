//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{CheckedSnapshot, CrawlWindow};
use crate::storage::{RecordSummary, RepoRecord};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt store {path}: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The crawl keeps three independent stores plus one snapshot per collected repository.
/// Every store can be reloaded at startup; a store that does not exist yet loads as
/// empty. Implementations are driven through `&mut self` and shared behind a mutex.
pub trait Storage: Send {
    // ===== Result Store =====

    /// Reads identity and file counts of every record in the result store
    ///
    /// Lines that cannot be decoded are skipped.
    fn load_record_summaries(&self) -> StorageResult<Vec<RecordSummary>>;

    /// Appends one complete record to the result store
    fn append_record(&mut self, record: &RepoRecord) -> StorageResult<()>;

    /// Writes the standalone snapshot of one record, returning its path
    fn write_snapshot(&mut self, record: &RepoRecord) -> StorageResult<PathBuf>;

    // ===== Checked Set =====

    /// Loads the checked-set store
    fn load_checked(&self) -> StorageResult<Option<CheckedSnapshot>>;

    /// Replaces the checked-set store
    fn save_checked(&mut self, snapshot: &CheckedSnapshot) -> StorageResult<()>;

    // ===== Cursor =====

    /// Loads the persisted crawl window
    fn load_window(&self) -> StorageResult<Option<CrawlWindow>>;

    /// Replaces the persisted crawl window
    fn save_window(&mut self, window: &CrawlWindow) -> StorageResult<()>;
}
