//! Per-run duplicate suppression.
//!
//! A [`Deduplicator`] remembers every [`DedupKey`] observed during one
//! ingestion run. Keys are reduced to a SHA-256 digest so the set costs a
//! fixed 32 bytes per distinct record regardless of URL or agent length.
//! Each field is length-prefixed before hashing, so `("ab", "c")` and
//! `("a", "bc")` produce different digests.
//!
//! The set is owned by exactly one run; nothing is shared across runs.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::models::{DedupKey, LogRecord};

#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<[u8; 32]>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time a record's key is seen in this run,
    /// `false` for every later occurrence.
    pub fn observe(&mut self, record: &LogRecord) -> bool {
        self.seen.insert(digest(&record.dedup_key()))
    }

    /// Number of distinct keys accepted so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn digest(key: &DedupKey<'_>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for field in [key.source_client, key.timestamp, key.method, key.resource] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.update(key.status_code.to_le_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}
