//! Summary statistics over ingested logs.
//!
//! Totals across all files (rows, distinct clients, error responses) and a
//! per-file breakdown. Used by `logsift stats` and `GET /stats`.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// Status codes at or above this count as errors.
const ERROR_STATUS: i64 = 400;

#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    pub file_name: String,
    pub upload_date: String,
    pub record_count: i64,
    pub unique_ips: i64,
    pub error_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_logs: i64,
    pub unique_ips: i64,
    pub error_count: i64,
    pub files: Vec<FileStats>,
}

pub async fn summary(pool: &SqlitePool) -> Result<Summary> {
    let totals = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total_logs,
            COUNT(DISTINCT ip) AS unique_ips,
            COALESCE(SUM(CASE WHEN status_code >= ? THEN 1 ELSE 0 END), 0) AS error_count
        FROM logs
        "#,
    )
    .bind(ERROR_STATUS)
    .fetch_one(pool)
    .await?;

    // Files still being ingested show up with whatever has been committed.
    let file_rows = sqlx::query(
        r#"
        SELECT
            f.file_name,
            f.upload_date,
            f.record_count,
            COUNT(DISTINCT l.ip) AS unique_ips,
            COALESCE(SUM(CASE WHEN l.status_code >= ? THEN 1 ELSE 0 END), 0) AS error_count
        FROM files f
        LEFT JOIN logs l ON l.file_name = f.file_name
        GROUP BY f.id
        ORDER BY f.upload_date DESC, f.id DESC
        "#,
    )
    .bind(ERROR_STATUS)
    .fetch_all(pool)
    .await?;

    let files = file_rows
        .iter()
        .map(|r| FileStats {
            file_name: r.get("file_name"),
            upload_date: r.get("upload_date"),
            record_count: r.get("record_count"),
            unique_ips: r.get("unique_ips"),
            error_count: r.get("error_count"),
        })
        .collect();

    Ok(Summary {
        total_logs: totals.get("total_logs"),
        unique_ips: totals.get("unique_ips"),
        error_count: totals.get("error_count"),
        files,
    })
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let s = summary(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("logsift — Database Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Log rows:    {}", s.total_logs);
    println!("  Clients:     {}", s.unique_ips);
    println!(
        "  Errors:      {} ({}%)",
        s.error_count,
        if s.total_logs > 0 {
            (s.error_count * 100) / s.total_logs
        } else {
            0
        }
    );

    if !s.files.is_empty() {
        println!();
        println!("  By file:");
        println!(
            "  {:<32} {:>9} {:>8} {:>8}   {}",
            "FILE", "RECORDS", "CLIENTS", "ERRORS", "UPLOADED"
        );
        println!("  {}", "-".repeat(80));
        for f in &s.files {
            println!(
                "  {:<32} {:>9} {:>8} {:>8}   {}",
                f.file_name, f.record_count, f.unique_ips, f.error_count, f.upload_date
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
