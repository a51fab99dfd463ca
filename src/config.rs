//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/logsift.sqlite"
//!
//! [ingest]
//! batch_size = 500
//! progress_interval = 100
//! retention_secs = 3600
//!
//! [server]
//! bind = "127.0.0.1:5000"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```
//!
//! Only `[db]` is required; every other section falls back to the values
//! shown above.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Records per transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Lines between progress-tracker updates.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// How long finished runs stay visible in the progress tracker.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            progress_interval: default_progress_interval(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl IngestConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn default_batch_size() -> usize {
    logsift_core::batch::DEFAULT_BATCH_SIZE
}
fn default_progress_interval() -> u64 {
    100
}
fn default_retention_secs() -> u64 {
    3600
}

/// Shortest allowed retention for finished runs, so a client polling every
/// few seconds cannot miss the terminal state.
pub const MIN_RETENTION_SECS: u64 = 300;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl Config {
    /// All defaults, storing the database at `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            ingest: IngestConfig::default(),
            server: ServerConfig::default(),
            logging: LogConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            anyhow::bail!("ingest.batch_size must be > 0");
        }
        if self.ingest.progress_interval == 0 {
            anyhow::bail!("ingest.progress_interval must be > 0");
        }
        if self.ingest.retention_secs < MIN_RETENTION_SECS {
            anyhow::bail!("ingest.retention_secs must be >= {}", MIN_RETENTION_SECS);
        }
        if self.server.bind.trim().is_empty() {
            anyhow::bail!("server.bind must not be empty");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogFormat, LogLevel};

    fn parse(s: &str) -> Result<Config> {
        let c: Config = toml::from_str(s)?;
        c.validate()?;
        Ok(c)
    }

    #[test]
    fn db_section_alone_is_enough() {
        let c = parse("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(c.ingest.batch_size, 500);
        assert_eq!(c.ingest.progress_interval, 100);
        assert_eq!(c.ingest.retention_secs, 3600);
        assert_eq!(c.server.bind, "127.0.0.1:5000");
        assert_eq!(c.logging.level, LogLevel::Info);
        assert_eq!(c.logging.format, LogFormat::Text);
    }

    #[test]
    fn overrides_are_read() {
        let c = parse(
            r#"
[db]
path = "x.sqlite"

[ingest]
batch_size = 50
progress_interval = 10
retention_secs = 600

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(c.ingest.batch_size, 50);
        assert_eq!(c.ingest.progress_interval, 10);
        assert_eq!(c.ingest.retention(), Duration::from_secs(600));
        assert_eq!(c.logging.level, LogLevel::Debug);
        assert_eq!(c.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_db_is_rejected() {
        assert!(parse("[ingest]\nbatch_size = 5\n").is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse("[db]\npath = \"x\"\n[ingest]\nbatch_size = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[ingest]\nprogress_interval = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[ingest]\nretention_secs = 10\n").is_err());
    }
}
