//! # logsift core
//!
//! Runtime-agnostic pieces of the logsift ingestion pipeline: the access-log
//! record model, the line parser, per-run deduplication, the progress
//! tracker, batching, and the store trait with an in-memory backend.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The application
//! crate wires these parts to SQLite and to the file reader.

pub mod batch;
pub mod dedup;
pub mod models;
pub mod naming;
pub mod parser;
pub mod store;
pub mod tracker;
