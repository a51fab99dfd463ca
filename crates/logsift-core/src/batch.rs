//! Bounded-size batching of accepted records.
//!
//! [`BatchWriter`] buffers records for one run and commits them through a
//! [`LogStore`] each time the buffer reaches `batch_size`. Each commit is one
//! store transaction; a rejected commit drops the buffered records and the
//! error is returned to the caller. Batches committed earlier stay committed.
//!
//! [`BatchWriter::finish`] must be called once at the end of a successful
//! run. It commits the remaining buffer (possibly empty) together with the
//! file's final `record_count`, so a reader never sees the final rows
//! without the final count or vice versa.

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::LogRecord;
use crate::store::LogStore;

/// Default number of records per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 500;

pub struct BatchWriter<'a> {
    store: &'a dyn LogStore,
    file_name: &'a str,
    upload_date: &'a str,
    batch_size: usize,
    buffer: Vec<LogRecord>,
    committed: u64,
}

impl<'a> BatchWriter<'a> {
    pub fn new(
        store: &'a dyn LogStore,
        file_name: &'a str,
        upload_date: &'a str,
        batch_size: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            file_name,
            upload_date,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            committed: 0,
        }
    }

    /// Buffer one record, committing the batch once it is full.
    pub async fn push(&mut self, record: LogRecord) -> Result<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Commit whatever is buffered as one transaction.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        self.store
            .insert_batch(self.file_name, self.upload_date, &batch)
            .await
            .with_context(|| {
                format!(
                    "failed to commit batch of {} records for {}",
                    batch.len(),
                    self.file_name
                )
            })?;
        self.committed += batch.len() as u64;
        self.buffer = batch;
        self.buffer.clear();
        debug!(file_name = %self.file_name, committed = self.committed, "batch committed");
        Ok(())
    }

    /// Commit the trailing buffer and the final record count together.
    /// Returns the total number of records committed for the run.
    pub async fn finish(mut self) -> Result<u64> {
        let total = self.committed + self.buffer.len() as u64;
        self.store
            .complete_file(self.file_name, self.upload_date, &self.buffer, total)
            .await
            .with_context(|| format!("failed to finalize {}", self.file_name))?;
        self.committed = total;
        self.buffer.clear();
        Ok(total)
    }

    /// Records committed so far (excludes the current buffer).
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Records accepted so far, committed or buffered.
    pub fn accepted(&self) -> u64 {
        self.committed + self.buffer.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use crate::store::memory::InMemoryStore;

    fn record(i: usize) -> LogRecord {
        parse_line(&format!(
            r#"10.0.0.{} - - [10/Oct/2023:13:55:36 -0700] "GET /r/{} HTTP/1.1" 200 10 "-" "t" 0.1"#,
            i % 250,
            i
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn commits_each_full_batch() {
        let store = InMemoryStore::new();
        let name = store.register_file("a.log", "now").await.unwrap();
        let mut w = BatchWriter::new(&store, &name, "now", 3);
        for i in 0..7 {
            w.push(record(i)).await.unwrap();
        }
        assert_eq!(store.commit_count(), 2);
        assert_eq!(w.committed(), 6);
        assert_eq!(w.accepted(), 7);

        let total = w.finish().await.unwrap();
        assert_eq!(total, 7);
        assert_eq!(store.commit_count(), 3);
        assert_eq!(store.count_records(&name).await.unwrap(), 7);
        assert_eq!(
            store.file_metadata(&name).await.unwrap().unwrap().record_count,
            7
        );
    }

    #[tokio::test]
    async fn finish_commits_even_when_empty() {
        let store = InMemoryStore::new();
        let name = store.register_file("empty.log", "now").await.unwrap();
        let w = BatchWriter::new(&store, &name, "now", 500);
        assert_eq!(w.finish().await.unwrap(), 0);
        assert_eq!(store.commit_count(), 1);
        assert_eq!(
            store.file_metadata(&name).await.unwrap().unwrap().record_count,
            0
        );
    }

    #[tokio::test]
    async fn rejected_batch_keeps_earlier_commits() {
        let store = InMemoryStore::fail_after_commits(1);
        let name = store.register_file("a.log", "now").await.unwrap();
        let mut w = BatchWriter::new(&store, &name, "now", 2);
        w.push(record(0)).await.unwrap();
        w.push(record(1)).await.unwrap();
        w.push(record(2)).await.unwrap();
        let err = w.push(record(3)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("commit budget"));
        assert_eq!(store.count_records(&name).await.unwrap(), 2);
        assert_eq!(w.committed(), 2);
        assert_eq!(w.accepted(), 2);
    }
}
