//! Ingestion pipeline orchestration.
//!
//! One run ingests one file under one logical name:
//!
//! ```text
//! submit ─▶ register name ─▶ tracker.start
//!              │
//!              ▼
//!          Scanning   count line boundaries (no parsing)
//!              │
//!              ▼
//!          Processing read line ─▶ parse ─▶ dedup ─▶ BatchWriter
//!              │       tracker.update every `progress_interval` lines
//!              ▼
//!          finish: final batch + record_count in one transaction
//!              │
//!              ▼
//!          Completed            (any I/O or store failure ─▶ Error)
//! ```
//!
//! Unparseable and duplicate lines are skipped but still count as
//! processed. A failed run is not retried; resubmitting the file starts an
//! independent run with its own deduplication scope.
//!
//! The same pipeline serves both execution strategies: [`ExecutionMode::Inline`]
//! awaits the run, [`ExecutionMode::Background`] spawns it and returns at
//! once, leaving the [`ProgressTracker`] as the only way to observe it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{error, info, info_span, Instrument};

use logsift_core::batch::BatchWriter;
use logsift_core::dedup::Deduplicator;
use logsift_core::models::UPLOAD_DATE_FORMAT;
use logsift_core::naming;
use logsift_core::parser::parse_line;
use logsift_core::store::LogStore;
use logsift_core::tracker::ProgressTracker;

use crate::config::{Config, IngestConfig};
use crate::db;
use crate::progress::ProgressMode;
use crate::sqlite_store::SqliteStore;
use crate::status::{StatusQuery, StatusResponse};

/// How often `logsift ingest` polls the run it submitted.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How a submitted run is executed relative to the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionMode {
    /// Run to completion before `submit` returns.
    Inline,
    /// Spawn onto the tokio runtime; `submit` returns immediately.
    Background,
}

#[derive(Clone, Copy, Debug)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub progress_interval: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for IngestOptions {
    fn from(cfg: &IngestConfig) -> Self {
        Self {
            batch_size: cfg.batch_size,
            progress_interval: cfg.progress_interval,
        }
    }
}

/// Drives runs against a shared store and progress tracker.
///
/// Cloning is cheap; clones share the store and the tracker.
#[derive(Clone)]
pub struct IngestionCoordinator {
    store: Arc<dyn LogStore>,
    tracker: ProgressTracker,
    options: IngestOptions,
}

impl IngestionCoordinator {
    pub fn new(store: Arc<dyn LogStore>, tracker: ProgressTracker, options: IngestOptions) -> Self {
        Self {
            store,
            tracker,
            options,
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Register a run for `path` under `requested_name` and execute it.
    ///
    /// Returns the logical name the run was registered under, which may
    /// carry a timestamp suffix if the requested name was taken. With
    /// [`ExecutionMode::Inline`] a failed run is also returned as an error;
    /// with [`ExecutionMode::Background`] only registration errors are.
    pub async fn submit(
        &self,
        path: impl Into<PathBuf>,
        requested_name: &str,
        mode: ExecutionMode,
    ) -> Result<String> {
        let path = path.into();
        let requested = naming::sanitize_name(requested_name)?;
        let upload_date = Local::now().format(UPLOAD_DATE_FORMAT).to_string();

        let file_name = self
            .store
            .register_file(&requested, &upload_date)
            .await
            .with_context(|| format!("failed to register '{}'", requested))?;
        self.tracker.start(&file_name)?;
        info!(file_name = %file_name, path = %path.display(), ?mode, "run accepted");

        let span = info_span!("ingest", file_name = %file_name);
        match mode {
            ExecutionMode::Inline => {
                self.run(&path, &file_name, &upload_date)
                    .instrument(span)
                    .await?;
            }
            ExecutionMode::Background => {
                let this = self.clone();
                let name = file_name.clone();
                tokio::spawn(
                    async move {
                        // Outcome is recorded in the tracker.
                        let _ = this.run(&path, &name, &upload_date).await;
                    }
                    .instrument(span),
                );
            }
        }

        Ok(file_name)
    }

    /// Execute a registered run whose tracker entry has been started,
    /// recording the terminal state in the tracker.
    pub async fn run(&self, path: &Path, file_name: &str, upload_date: &str) -> Result<()> {
        let result = self.execute(path, file_name, upload_date).await;
        if let Err(err) = &result {
            let detail = format!("{:#}", err);
            error!(file_name = %file_name, error = %detail, "ingestion failed");
            if let Err(e) = self.tracker.fail(file_name, detail) {
                error!(file_name = %file_name, error = %e, "could not record failure");
            }
        }
        result
    }

    async fn execute(&self, path: &Path, file_name: &str, upload_date: &str) -> Result<()> {
        let total = count_lines(path).await?;
        self.tracker.update(file_name, 0, Some(total))?;
        info!(file_name = %file_name, total_lines = total, "scan complete");

        let file = File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();

        let mut dedup = Deduplicator::new();
        let mut writer = BatchWriter::new(
            self.store.as_ref(),
            file_name,
            upload_date,
            self.options.batch_size,
        );
        let interval = self.options.progress_interval.max(1);
        let mut processed = 0u64;

        while read_line(&mut reader, &mut buf)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?
        {
            processed += 1;

            let line = String::from_utf8_lossy(&buf);
            if let Some(record) = parse_line(&line) {
                if dedup.observe(&record) {
                    writer.push(record).await?;
                }
            }

            if processed % interval == 0 {
                self.tracker.update(file_name, processed, Some(total))?;
            }
        }

        let accepted = writer.finish().await?;
        let total = total.max(processed);
        self.tracker.update(file_name, processed, Some(total))?;
        self.tracker.complete(file_name, accepted)?;

        info!(
            file_name = %file_name,
            total_lines = total,
            processed = processed,
            accepted = accepted,
            "ingestion completed"
        );
        Ok(())
    }
}

/// Run the ingest command: submit a background run, poll its status until
/// it is terminal and report each change.
pub async fn run_ingest(
    config: &Config,
    path: &Path,
    name: Option<&str>,
    progress: ProgressMode,
) -> Result<()> {
    let requested = match name {
        Some(n) => n.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("cannot derive a name from {}", path.display()))?,
    };

    let pool = db::connect(config).await?;
    let store: Arc<dyn LogStore> = Arc::new(SqliteStore::new(pool.clone()));
    let tracker = ProgressTracker::new(config.ingest.retention());
    let coordinator =
        IngestionCoordinator::new(store.clone(), tracker.clone(), (&config.ingest).into());
    let status = StatusQuery::new(tracker, store);

    let file_name = coordinator
        .submit(path, &requested, ExecutionMode::Background)
        .await?;

    let reporter = progress.reporter();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut last = None;
    let outcome = loop {
        ticker.tick().await;
        let current = status.status(&file_name).await;
        if last.as_ref() != Some(&current) {
            reporter.report(&file_name, &current);
        }
        if current.is_terminal() {
            break current;
        }
        last = Some(current);
    };
    pool.close().await;

    match outcome {
        StatusResponse::Completed {
            processed,
            accepted,
            ..
        } => {
            println!(
                "Ingested {} as {}: {} lines processed, {} records stored.",
                path.display(),
                file_name,
                processed,
                accepted
            );
            Ok(())
        }
        StatusResponse::Error { error } => bail!("ingestion of {} failed: {}", file_name, error),
        other => bail!("ingestion of {} ended in unexpected state {:?}", file_name, other),
    }
}

/// Read one `\n`-terminated line (terminator included) into `buf`.
/// Returns `false` at end of input.
async fn read_line(reader: &mut BufReader<File>, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    let n = reader.read_until(b'\n', buf).await?;
    Ok(n > 0)
}

/// Count lines the way the processing pass reads them: every `\n`, plus a
/// final unterminated line if the file does not end with one.
pub async fn count_lines(path: &Path) -> Result<u64> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut chunk = vec![0u8; 64 * 1024];
    let mut lines = 0u64;
    let mut last = None;

    loop {
        let n = file
            .read(&mut chunk)
            .await
            .with_context(|| format!("failed to scan {}", path.display()))?;
        if n == 0 {
            break;
        }
        lines += chunk[..n].iter().filter(|&&b| b == b'\n').count() as u64;
        last = Some(chunk[n - 1]);
    }

    if matches!(last, Some(b) if b != b'\n') {
        lines += 1;
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[tokio::test]
    async fn count_lines_handles_terminators() {
        let cases: [(&[u8], u64); 6] = [
            (b"", 0),
            (b"a", 1),
            (b"a\n", 1),
            (b"a\nb", 2),
            (b"a\r\nb\r\n", 2),
            (b"\n\n\n", 3),
        ];
        for (content, expected) in cases {
            let f = write_tmp(content);
            assert_eq!(count_lines(f.path()).await.unwrap(), expected, "{:?}", content);
        }
    }

    #[tokio::test]
    async fn read_line_agrees_with_count() {
        let f = write_tmp(b"one\ntwo\n\nfour");
        let mut reader = BufReader::new(File::open(f.path()).await.unwrap());
        let mut buf = Vec::new();
        let mut n = 0;
        while read_line(&mut reader, &mut buf).await.unwrap() {
            n += 1;
        }
        assert_eq!(n, count_lines(f.path()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = count_lines(Path::new("/nonexistent/logsift/input.log"))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("failed to open"));
    }
}
