//! In-memory [`LogStore`] implementation for tests and embedders.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. A commit budget can
//! be set with [`InMemoryStore::fail_after_commits`] to make later
//! transactions fail, which is how the pipeline's failure handling is tested.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Local;

use crate::models::{FileMetadata, LogRecord};
use crate::naming;

use super::LogStore;

struct StoredRow {
    file_name: String,
    record: LogRecord,
}

pub struct InMemoryStore {
    files: RwLock<HashMap<String, FileMetadata>>,
    rows: RwLock<Vec<StoredRow>>,
    commits: AtomicUsize,
    commit_budget: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            rows: RwLock::new(Vec::new()),
            commits: AtomicUsize::new(0),
            commit_budget: None,
        }
    }

    /// A store whose first `n` row-writing transactions succeed and every
    /// later one is rejected.
    pub fn fail_after_commits(n: usize) -> Self {
        Self {
            commit_budget: Some(n),
            ..Self::new()
        }
    }

    /// Committed records for `file_name`, in insertion order.
    pub fn records(&self, file_name: &str) -> Vec<LogRecord> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.file_name == file_name)
            .map(|r| r.record.clone())
            .collect()
    }

    /// Number of successful row-writing transactions so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<()> {
        let n = self.commits.load(Ordering::SeqCst);
        if let Some(budget) = self.commit_budget {
            if n >= budget {
                bail!("transaction rejected: commit budget of {} exhausted", budget);
            }
        }
        Ok(())
    }

    fn append(&self, file_name: &str, records: &[LogRecord]) -> Result<()> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| anyhow!("row table lock poisoned"))?;
        rows.extend(records.iter().map(|r| StoredRow {
            file_name: file_name.to_string(),
            record: r.clone(),
        }));
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for InMemoryStore {
    async fn register_file(&self, name: &str, upload_date: &str) -> Result<String> {
        let mut files = self
            .files
            .write()
            .map_err(|_| anyhow!("file table lock poisoned"))?;
        let name = naming::resolve_unique(name, Local::now().naive_local(), |c| {
            files.contains_key(c)
        });
        files.insert(
            name.clone(),
            FileMetadata {
                file_name: name.clone(),
                upload_date: upload_date.to_string(),
                record_count: 0,
            },
        );
        Ok(name)
    }

    async fn insert_batch(
        &self,
        file_name: &str,
        _upload_date: &str,
        records: &[LogRecord],
    ) -> Result<()> {
        self.begin()?;
        self.append(file_name, records)
    }

    async fn complete_file(
        &self,
        file_name: &str,
        _upload_date: &str,
        records: &[LogRecord],
        record_count: u64,
    ) -> Result<()> {
        self.begin()?;
        let mut files = self
            .files
            .write()
            .map_err(|_| anyhow!("file table lock poisoned"))?;
        self.append(file_name, records)?;
        if let Some(meta) = files.get_mut(file_name) {
            meta.record_count = record_count as i64;
        }
        Ok(())
    }

    async fn file_metadata(&self, file_name: &str) -> Result<Option<FileMetadata>> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        Ok(files.get(file_name).cloned())
    }

    async fn count_records(&self, file_name: &str) -> Result<u64> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.iter().filter(|r| r.file_name == file_name).count() as u64)
    }
}
