//! Run status lookup for pollers.
//!
//! Live runs are answered from the [`ProgressTracker`]. Once an entry is
//! gone (evicted, or the process restarted) the persisted `files` row is
//! the only record left: a positive `record_count` means the run finished,
//! anything else is reported as unknown.
//!
//! # Response shapes
//!
//! ```json
//! {"status": "processing", "progress": 42, "total": 1000, "processed": 420}
//! {"status": "completed", "progress": 100, "total": 1000, "processed": 1000, "accepted": 977}
//! {"status": "error", "error": "failed to commit batch of 500 records for a.log: ..."}
//! {"status": "unknown"}
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use logsift_core::models::RunStatus;
use logsift_core::store::LogStore;
use logsift_core::tracker::{ProgressTracker, RunSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusResponse {
    Processing {
        progress: u8,
        total: u64,
        processed: u64,
    },
    Completed {
        progress: u8,
        total: u64,
        processed: u64,
        accepted: u64,
    },
    Error {
        error: String,
    },
    Unknown,
}

impl StatusResponse {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusResponse::Processing { .. })
    }
}

impl From<&RunSnapshot> for StatusResponse {
    fn from(snap: &RunSnapshot) -> Self {
        match snap.status {
            RunStatus::Processing => StatusResponse::Processing {
                progress: snap.progress_percent().unwrap_or(0),
                total: snap.total_lines.unwrap_or(0),
                processed: snap.processed_lines,
            },
            RunStatus::Completed => StatusResponse::Completed {
                progress: 100,
                total: snap.total_lines.unwrap_or(snap.processed_lines),
                processed: snap.processed_lines,
                accepted: snap.accepted_records,
            },
            RunStatus::Error => StatusResponse::Error {
                error: snap
                    .error_detail
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
        }
    }
}

#[derive(Clone)]
pub struct StatusQuery {
    tracker: ProgressTracker,
    store: Arc<dyn LogStore>,
}

impl StatusQuery {
    pub fn new(tracker: ProgressTracker, store: Arc<dyn LogStore>) -> Self {
        Self { tracker, store }
    }

    pub async fn status(&self, file_name: &str) -> StatusResponse {
        if let Some(snap) = self.tracker.snapshot(file_name) {
            return StatusResponse::from(&snap);
        }

        match self.store.file_metadata(file_name).await {
            Ok(Some(meta)) if meta.record_count > 0 => {
                let n = meta.record_count as u64;
                StatusResponse::Completed {
                    progress: 100,
                    total: n,
                    processed: n,
                    accepted: n,
                }
            }
            Ok(_) => StatusResponse::Unknown,
            Err(e) => {
                warn!(file_name = %file_name, error = %e, "status fallback lookup failed");
                StatusResponse::Unknown
            }
        }
    }
}
