//! # logsift
//!
//! Ingests large web-server access logs into SQLite and reports progress
//! to pollers while the run is still going.
//!
//! Each line is parsed into a structured record, duplicates within the run
//! are dropped, and the survivors are committed in bounded batches. A
//! process-wide tracker exposes the state of every run, and reads keep
//! working against the WAL-mode database next to an in-flight ingestion.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │ log file │──▶│ parse ▶ dedup ▶ batch     │──▶│  SQLite  │
//! └──────────┘   └────────────┬─────────────┘   └────┬─────┘
//!                             │ progress             │
//!                             ▼                      │
//!                     ┌───────────────┐              │
//!                     │ProgressTracker│◀── status ───┤
//!                     └───────────────┘              │
//!                      ┌─────────┐        ┌──────────┴┐
//!                      │   CLI   │        │   HTTP    │
//!                      └─────────┘        └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! logsift init                        # create database
//! logsift ingest ./access.log         # ingest with progress on stderr
//! logsift logs --status 500           # query rows
//! logsift serve                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite implementation of the store trait |
//! | [`ingest`] | Run orchestration and the `ingest` command |
//! | [`progress`] | CLI progress reporters |
//! | [`status`] | Status lookup for pollers |
//! | [`query`] | Read and maintenance queries |
//! | [`stats`] | Summary statistics |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod progress;
pub mod query;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod status;
