//! SQLite-backed [`LogStore`] implementation.
//!
//! Maps each [`LogStore`] operation onto the `logs` and `files` tables
//! created by [`crate::migrate`]. Every batch is one transaction, so WAL
//! readers only ever see whole batches.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Local;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use logsift_core::models::{FileMetadata, LogRecord};
use logsift_core::naming;
use logsift_core::store::LogStore;

/// Registration gives up after this many taken candidate names.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// SQLite implementation of the [`LogStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn insert_rows(
    tx: &mut Transaction<'_, Sqlite>,
    file_name: &str,
    upload_date: &str,
    records: &[LogRecord],
) -> Result<()> {
    for r in records {
        sqlx::query(
            r#"
            INSERT INTO logs (file_name, ip, remote_log_name, user_id, timestamp,
                              request_type, api, protocol, status_code, bytes,
                              referrer, user_agent, response_time, upload_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(file_name)
        .bind(&r.source_client)
        .bind(&r.remote_log_name)
        .bind(&r.user_id)
        .bind(&r.timestamp)
        .bind(&r.method)
        .bind(&r.resource)
        .bind(&r.protocol)
        .bind(r.status_code)
        .bind(&r.byte_count)
        .bind(&r.referrer)
        .bind(&r.user_agent)
        .bind(r.response_time_seconds)
        .bind(upload_date)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl LogStore for SqliteStore {
    async fn register_file(&self, name: &str, upload_date: &str) -> Result<String> {
        let now = Local::now().naive_local();
        for candidate in naming::candidates(name, now).take(MAX_NAME_ATTEMPTS) {
            let inserted = sqlx::query(
                r#"
                INSERT INTO files (file_name, upload_date, record_count) VALUES (?, ?, 0)
                ON CONFLICT(file_name) DO NOTHING
                "#,
            )
            .bind(&candidate)
            .bind(upload_date)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if inserted == 1 {
                return Ok(candidate);
            }
        }
        bail!("no free file name found for '{}'", name)
    }

    async fn insert_batch(
        &self,
        file_name: &str,
        upload_date: &str,
        records: &[LogRecord],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_rows(&mut tx, file_name, upload_date, records).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn complete_file(
        &self,
        file_name: &str,
        upload_date: &str,
        records: &[LogRecord],
        record_count: u64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_rows(&mut tx, file_name, upload_date, records).await?;

        let updated = sqlx::query("UPDATE files SET record_count = ? WHERE file_name = ?")
            .bind(record_count as i64)
            .bind(file_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            bail!("file '{}' is not registered", file_name);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn file_metadata(&self, file_name: &str) -> Result<Option<FileMetadata>> {
        let row = sqlx::query(
            "SELECT file_name, upload_date, record_count FROM files WHERE file_name = ?",
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| FileMetadata {
            file_name: r.get("file_name"),
            upload_date: r.get("upload_date"),
            record_count: r.get("record_count"),
        }))
    }

    async fn count_records(&self, file_name: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM logs WHERE file_name = ?")
            .bind(file_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use logsift_core::parser::parse_line;

    async fn store(tmp: &tempfile::TempDir) -> SqliteStore {
        let config = Config::minimal(tmp.path().join("t.sqlite"));
        let pool = db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn record(resource: &str) -> LogRecord {
        parse_line(&format!(
            r#"10.0.0.1 - - [10/Oct/2023:13:55:36 -0700] "GET {} HTTP/1.1" 200 1 "-" "t" 0.1"#,
            resource
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn taken_names_get_a_suffix() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp).await;

        let a = s.register_file("a.log", "2024-01-01 00:00:00").await.unwrap();
        let b = s.register_file("a.log", "2024-01-01 00:00:00").await.unwrap();
        let c = s.register_file("a.log", "2024-01-01 00:00:00").await.unwrap();
        assert_eq!(a, "a.log");
        assert!(b.starts_with("a_") && b.ends_with(".log"));
        assert_ne!(b, c);

        let meta = s.file_metadata(&b).await.unwrap().unwrap();
        assert_eq!(meta.record_count, 0);
    }

    #[tokio::test]
    async fn complete_file_writes_rows_and_count_together() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp).await;
        let name = s.register_file("a.log", "now").await.unwrap();

        s.insert_batch(&name, "now", &[record("/1"), record("/2")])
            .await
            .unwrap();
        s.complete_file(&name, "now", &[record("/3")], 3).await.unwrap();

        assert_eq!(s.count_records(&name).await.unwrap(), 3);
        assert_eq!(
            s.file_metadata(&name).await.unwrap().unwrap().record_count,
            3
        );
    }

    #[tokio::test]
    async fn completing_unregistered_file_rolls_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let s = store(&tmp).await;

        let err = s
            .complete_file("ghost.log", "now", &[record("/1")], 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not registered"));
        assert_eq!(s.count_records("ghost.log").await.unwrap(), 0);
        assert!(s.file_metadata("ghost.log").await.unwrap().is_none());
    }
}
