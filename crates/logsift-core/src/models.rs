//! Core data models shared by the ingestion pipeline and its stores.
//!
//! These types represent the parsed access-log records that flow through
//! the pipeline and the per-file metadata that survives a run.

use serde::Serialize;

/// One parsed access-log line.
///
/// `timestamp` keeps the original bracketed text (e.g.
/// `10/Oct/2023:13:55:36 -0700`) and `byte_count` stays textual because
/// servers write `-` when no body was sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub source_client: String,
    pub remote_log_name: String,
    pub user_id: String,
    pub timestamp: String,
    pub method: String,
    pub resource: String,
    pub protocol: String,
    pub status_code: i64,
    pub byte_count: String,
    pub referrer: String,
    pub user_agent: String,
    pub response_time_seconds: f64,
}

impl LogRecord {
    /// The fields that identify one logical request within a run.
    pub fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            source_client: &self.source_client,
            timestamp: &self.timestamp,
            method: &self.method,
            resource: &self.resource,
            status_code: self.status_code,
        }
    }
}

/// Borrowed `(client, timestamp, method, resource, status)` tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    pub source_client: &'a str,
    pub timestamp: &'a str,
    pub method: &'a str,
    pub resource: &'a str,
    pub status_code: i64,
}

/// Persisted row of the `files` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub file_name: String,
    pub upload_date: String,
    pub record_count: i64,
}

/// Lifecycle state of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Processing,
    Completed,
    Error,
}

impl RunStatus {
    /// Completed and Error are sinks: no further updates apply.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }
}

/// Format used for `upload_date` columns.
pub const UPLOAD_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
