//! Storage abstraction for ingested access logs.
//!
//! The [`LogStore`] trait covers exactly what the ingestion pipeline and the
//! status fallback need, so the pipeline can run against SQLite in
//! production and against [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync`: one store is shared by every
//! concurrent run and by status pollers.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{FileMetadata, LogRecord};

/// Durable backend for log rows and per-file metadata.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`register_file`](LogStore::register_file) | Create the metadata row with `record_count = 0` |
/// | [`insert_batch`](LogStore::insert_batch) | Commit one batch of rows atomically |
/// | [`complete_file`](LogStore::complete_file) | Commit the final batch and the final count together |
/// | [`file_metadata`](LogStore::file_metadata) | Read the metadata row |
/// | [`count_records`](LogStore::count_records) | Count committed rows for a file |
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Register a run under the first free variant of `name` (see
    /// [`crate::naming`]) and return the name actually registered.
    async fn register_file(&self, name: &str, upload_date: &str) -> Result<String>;

    /// Insert all `records` for `file_name` in one transaction. Either every
    /// row is committed or none is.
    async fn insert_batch(
        &self,
        file_name: &str,
        upload_date: &str,
        records: &[LogRecord],
    ) -> Result<()>;

    /// Insert the trailing `records` and set the file's `record_count` in a
    /// single transaction. Called exactly once per successful run, with an
    /// empty slice when nothing is buffered.
    async fn complete_file(
        &self,
        file_name: &str,
        upload_date: &str,
        records: &[LogRecord],
        record_count: u64,
    ) -> Result<()>;

    async fn file_metadata(&self, file_name: &str) -> Result<Option<FileMetadata>>;

    async fn count_records(&self, file_name: &str) -> Result<u64>;
}
