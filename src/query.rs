//! Read and maintenance queries over ingested logs.
//!
//! Each operation has a data-returning function taking a pool (used by the
//! HTTP server) and a `run_*` CLI entry point that prints to stdout. All of
//! them run as ordinary WAL readers/writers next to in-flight ingestion.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{de, Deserialize, Deserializer, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use logsift_core::models::FileMetadata;

use crate::config::Config;
use crate::db;

/// Rows per page for [`query_logs`].
pub const PAGE_SIZE: i64 = 100;

/// One persisted `logs` row, using the table's column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRow {
    pub id: i64,
    pub file_name: String,
    pub ip: String,
    pub remote_log_name: String,
    pub user_id: String,
    pub timestamp: String,
    pub request_type: String,
    pub api: String,
    pub protocol: String,
    pub status_code: i64,
    pub bytes: String,
    pub referrer: String,
    pub user_agent: String,
    pub response_time: f64,
    pub upload_date: String,
}

/// Filters for [`query_logs`]. Empty strings are treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    /// Exact file name.
    pub file_name: Option<String>,
    /// Exact status code.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub status_code: Option<i64>,
    /// Substring of the client address.
    pub ip: Option<String>,
    /// Exact request method.
    pub request_type: Option<String>,
    /// 1-based page number.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub page: Option<i64>,
}

/// Numeric query parameter where `status_code=` means "no filter".
fn empty_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(de::Error::custom),
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl LogFilter {
    fn push_where<'a>(&'a self, qb: &mut QueryBuilder<'a, Sqlite>) {
        qb.push(" WHERE 1=1");
        if let Some(name) = non_empty(&self.file_name) {
            qb.push(" AND file_name = ").push_bind(name);
        }
        if let Some(code) = self.status_code {
            qb.push(" AND status_code = ").push_bind(code);
        }
        if let Some(ip) = non_empty(&self.ip) {
            qb.push(" AND ip LIKE ").push_bind(format!("%{}%", ip));
        }
        if let Some(method) = non_empty(&self.request_type) {
            qb.push(" AND request_type = ").push_bind(method);
        }
    }

    /// Requested page, clamped so the row offset cannot overflow.
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).clamp(1, i64::MAX / PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub logs: Vec<LogRow>,
    pub total_count: i64,
    pub page: i64,
    pub total_pages: i64,
}

/// All registered files, newest upload first.
pub async fn list_files(pool: &SqlitePool) -> Result<Vec<FileMetadata>> {
    let rows = sqlx::query(
        "SELECT file_name, upload_date, record_count FROM files ORDER BY upload_date DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| FileMetadata {
            file_name: r.get("file_name"),
            upload_date: r.get("upload_date"),
            record_count: r.get("record_count"),
        })
        .collect())
}

/// One page of matching rows, newest insert first, plus the match count.
pub async fn query_logs(pool: &SqlitePool, filter: &LogFilter) -> Result<LogPage> {
    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM logs");
    filter.push_where(&mut count_qb);
    let total_count: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let page = filter.page();
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, file_name, ip, remote_log_name, user_id, timestamp, request_type, api, \
         protocol, status_code, bytes, referrer, user_agent, response_time, upload_date FROM logs",
    );
    filter.push_where(&mut qb);
    qb.push(" ORDER BY id DESC LIMIT ")
        .push_bind(PAGE_SIZE)
        .push(" OFFSET ")
        .push_bind((page - 1) * PAGE_SIZE);

    let rows = qb.build().fetch_all(pool).await?;
    let logs = rows
        .iter()
        .map(|r| LogRow {
            id: r.get("id"),
            file_name: r.get("file_name"),
            ip: r.get("ip"),
            remote_log_name: r.get("remote_log_name"),
            user_id: r.get("user_id"),
            timestamp: r.get("timestamp"),
            request_type: r.get("request_type"),
            api: r.get("api"),
            protocol: r.get("protocol"),
            status_code: r.get("status_code"),
            bytes: r.get("bytes"),
            referrer: r.get("referrer"),
            user_agent: r.get("user_agent"),
            response_time: r.get("response_time"),
            upload_date: r.get("upload_date"),
        })
        .collect();

    Ok(LogPage {
        logs,
        total_count,
        page,
        total_pages: (total_count + PAGE_SIZE - 1) / PAGE_SIZE,
    })
}

/// Delete a file's rows and its metadata in one transaction.
/// Returns `false` if nothing was registered under that name.
pub async fn delete_file(pool: &SqlitePool, file_name: &str) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let logs = sqlx::query("DELETE FROM logs WHERE file_name = ?")
        .bind(file_name)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let files = sqlx::query("DELETE FROM files WHERE file_name = ?")
        .bind(file_name)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;
    Ok(logs + files > 0)
}

/// Remove every log row and file record. Returns `(logs, files)` deleted.
pub async fn reset(pool: &SqlitePool) -> Result<(u64, u64)> {
    let mut tx = pool.begin().await?;
    let logs = sqlx::query("DELETE FROM logs")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let files = sqlx::query("DELETE FROM files")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    tx.commit().await?;
    Ok((logs, files))
}

// ============ CLI entry points ============

pub async fn run_list_files(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let files = list_files(&pool).await?;
    pool.close().await;

    if files.is_empty() {
        println!("No files ingested.");
        return Ok(());
    }
    println!("{:<40} {:<20} {:>10}", "FILE", "UPLOADED", "RECORDS");
    println!("{}", "-".repeat(72));
    for f in &files {
        println!(
            "{:<40} {:<20} {:>10}",
            f.file_name, f.upload_date, f.record_count
        );
    }
    Ok(())
}

pub async fn run_query_logs(config: &Config, filter: &LogFilter) -> Result<()> {
    let pool = db::connect(config).await?;
    let page = query_logs(&pool, filter).await?;
    pool.close().await;

    for row in &page.logs {
        println!(
            "{} [{}] {} \"{} {} {}\" {} {} {:.3}s",
            row.file_name,
            row.timestamp,
            row.ip,
            row.request_type,
            row.api,
            row.protocol,
            row.status_code,
            row.bytes,
            row.response_time
        );
    }
    println!(
        "page {} of {} ({} matching rows)",
        page.page,
        page.total_pages.max(1),
        page.total_count
    );
    Ok(())
}

pub async fn run_delete(config: &Config, file_name: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let existed = delete_file(&pool, file_name).await?;
    pool.close().await;

    if !existed {
        anyhow::bail!("file not found: {}", file_name);
    }
    println!("Deleted {} and all its logs.", file_name);
    Ok(())
}

pub async fn run_reset(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let (logs, files) = reset(&pool).await?;
    pool.close().await;

    println!("Reset complete: removed {} logs from {} files.", logs, files);
    Ok(())
}
