//! In-memory progress tracking for ingestion runs.
//!
//! [`ProgressTracker`] is a cheaply cloneable handle to one shared map from
//! logical file name to [`RunSnapshot`]. The ingestion task is the only
//! writer for its own key; any number of status pollers read concurrently.
//! The map sits behind a single `RwLock` and every operation holds it for
//! one key's worth of work, so neither side waits on the other for longer
//! than a single update.
//!
//! # Lifecycle
//!
//! ```text
//! start ──▶ Processing ──update*──▶ Processing ──complete──▶ Completed
//!                                        └────────fail─────▶ Error
//! ```
//!
//! Completed and Error are sinks. Terminal entries are retained for the
//! configured retention window after their transition, then dropped by
//! [`ProgressTracker::evict_expired`] (also run lazily on every `start`).
//! Processing entries are never evicted.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::models::RunStatus;

/// Observable state of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub file_name: String,
    pub status: RunStatus,
    pub processed_lines: u64,
    /// `None` until the scanning pass has counted the input.
    pub total_lines: Option<u64>,
    pub accepted_records: u64,
    pub error_detail: Option<String>,
}

impl RunSnapshot {
    fn processing(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            status: RunStatus::Processing,
            processed_lines: 0,
            total_lines: None,
            accepted_records: 0,
            error_detail: None,
        }
    }

    /// `floor(processed / total * 100)`, or `None` while the total is unknown.
    ///
    /// Completed runs always report 100, including empty inputs.
    pub fn progress_percent(&self) -> Option<u8> {
        if self.status == RunStatus::Completed {
            return Some(100);
        }
        match self.total_lines {
            Some(0) | None => None,
            Some(total) => {
                let pct = self.processed_lines.min(total) * 100 / total;
                Some(pct as u8)
            }
        }
    }
}

struct Entry {
    snapshot: RunSnapshot,
    finished_at: Option<Instant>,
}

/// Shared, injectable progress map. Clones refer to the same map.
#[derive(Clone)]
pub struct ProgressTracker {
    runs: Arc<RwLock<HashMap<String, Entry>>>,
    retention: Duration,
}

impl ProgressTracker {
    pub fn new(retention: Duration) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Create (or replace) the entry for `name` in the Processing state.
    pub fn start(&self, name: &str) -> Result<()> {
        let now = Instant::now();
        let mut runs = self.write()?;
        evict_before(&mut runs, now, self.retention);
        runs.insert(
            name.to_string(),
            Entry {
                snapshot: RunSnapshot::processing(name),
                finished_at: None,
            },
        );
        Ok(())
    }

    /// Record progress for a running entry.
    ///
    /// `processed_lines` never moves backwards and a known total is never
    /// cleared. Updates to unknown or terminal entries are ignored.
    pub fn update(&self, name: &str, processed_lines: u64, total_lines: Option<u64>) -> Result<()> {
        let mut runs = self.write()?;
        if let Some(entry) = runs.get_mut(name) {
            let snap = &mut entry.snapshot;
            if snap.status.is_terminal() {
                return Ok(());
            }
            snap.processed_lines = snap.processed_lines.max(processed_lines);
            if total_lines.is_some() {
                snap.total_lines = total_lines;
            }
        }
        Ok(())
    }

    /// Terminal transition to Completed.
    pub fn complete(&self, name: &str, accepted_records: u64) -> Result<()> {
        self.finish(name, |snap| {
            snap.status = RunStatus::Completed;
            snap.accepted_records = accepted_records;
        })
    }

    /// Terminal transition to Error.
    pub fn fail(&self, name: &str, error_detail: impl Into<String>) -> Result<()> {
        let detail = error_detail.into();
        self.finish(name, |snap| {
            snap.status = RunStatus::Error;
            snap.error_detail = Some(detail);
        })
    }

    fn finish(&self, name: &str, apply: impl FnOnce(&mut RunSnapshot)) -> Result<()> {
        let mut runs = self.write()?;
        let entry = runs.entry(name.to_string()).or_insert_with(|| Entry {
            snapshot: RunSnapshot::processing(name),
            finished_at: None,
        });
        if entry.snapshot.status.is_terminal() {
            return Ok(());
        }
        apply(&mut entry.snapshot);
        entry.finished_at = Some(Instant::now());
        Ok(())
    }

    /// Current state of `name`, if it is still tracked.
    pub fn snapshot(&self, name: &str) -> Option<RunSnapshot> {
        let runs = self.runs.read().unwrap_or_else(PoisonError::into_inner);
        runs.get(name).map(|e| e.snapshot.clone())
    }

    /// Drop terminal entries older than the retention window. Returns the
    /// number of entries removed.
    pub fn evict_expired(&self) -> Result<usize> {
        self.evict_expired_at(Instant::now())
    }

    pub fn evict_expired_at(&self, now: Instant) -> Result<usize> {
        let mut runs = self.write()?;
        Ok(evict_before(&mut runs, now, self.retention))
    }

    pub fn len(&self) -> usize {
        self.runs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>>> {
        self.runs
            .write()
            .map_err(|_| anyhow!("progress tracker lock poisoned"))
    }
}

fn evict_before(runs: &mut HashMap<String, Entry>, now: Instant, retention: Duration) -> usize {
    let before = runs.len();
    runs.retain(|_, entry| match entry.finished_at {
        Some(at) => now.saturating_duration_since(at) < retention,
        None => true,
    });
    before - runs.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(Duration::from_secs(300))
    }

    #[test]
    fn start_creates_processing_entry() {
        let t = tracker();
        t.start("a.log").unwrap();
        let s = t.snapshot("a.log").unwrap();
        assert_eq!(s.status, RunStatus::Processing);
        assert_eq!(s.processed_lines, 0);
        assert_eq!(s.total_lines, None);
        assert_eq!(s.progress_percent(), None);
    }

    #[test]
    fn unknown_name_has_no_snapshot() {
        assert!(tracker().snapshot("missing").is_none());
    }

    #[test]
    fn progress_is_floored_percentage() {
        let t = tracker();
        t.start("a").unwrap();
        t.update("a", 1, Some(3)).unwrap();
        assert_eq!(t.snapshot("a").unwrap().progress_percent(), Some(33));
        t.update("a", 2, Some(3)).unwrap();
        assert_eq!(t.snapshot("a").unwrap().progress_percent(), Some(66));
    }

    #[test]
    fn processed_lines_never_decrease() {
        let t = tracker();
        t.start("a").unwrap();
        t.update("a", 200, Some(1000)).unwrap();
        t.update("a", 100, None).unwrap();
        let s = t.snapshot("a").unwrap();
        assert_eq!(s.processed_lines, 200);
        assert_eq!(s.total_lines, Some(1000));
    }

    #[test]
    fn terminal_states_are_sinks() {
        let t = tracker();
        t.start("a").unwrap();
        t.update("a", 10, Some(10)).unwrap();
        t.complete("a", 7).unwrap();
        t.update("a", 50, Some(50)).unwrap();
        t.fail("a", "late failure").unwrap();
        let s = t.snapshot("a").unwrap();
        assert_eq!(s.status, RunStatus::Completed);
        assert_eq!(s.processed_lines, 10);
        assert_eq!(s.accepted_records, 7);
        assert!(s.error_detail.is_none());
        assert_eq!(s.progress_percent(), Some(100));

        t.start("b").unwrap();
        t.fail("b", "disk gone").unwrap();
        t.complete("b", 3).unwrap();
        let s = t.snapshot("b").unwrap();
        assert_eq!(s.status, RunStatus::Error);
        assert_eq!(s.error_detail.as_deref(), Some("disk gone"));
    }

    #[test]
    fn start_overwrites_previous_entry() {
        let t = tracker();
        t.start("a").unwrap();
        t.fail("a", "boom").unwrap();
        t.start("a").unwrap();
        assert_eq!(t.snapshot("a").unwrap().status, RunStatus::Processing);
    }

    #[test]
    fn empty_input_completes_at_100() {
        let t = tracker();
        t.start("empty").unwrap();
        t.update("empty", 0, Some(0)).unwrap();
        assert_eq!(t.snapshot("empty").unwrap().progress_percent(), None);
        t.complete("empty", 0).unwrap();
        assert_eq!(t.snapshot("empty").unwrap().progress_percent(), Some(100));
    }

    #[test]
    fn eviction_keeps_running_and_recent_entries() {
        let t = tracker();
        t.start("running").unwrap();
        t.start("done").unwrap();
        t.complete("done", 1).unwrap();

        assert_eq!(t.evict_expired().unwrap(), 0);
        assert_eq!(t.len(), 2);

        let later = Instant::now() + Duration::from_secs(301);
        assert_eq!(t.evict_expired_at(later).unwrap(), 1);
        assert!(t.snapshot("done").is_none());
        assert!(t.snapshot("running").is_some());
    }

    #[test]
    fn clones_share_state() {
        let t = tracker();
        let reader = t.clone();
        t.start("a").unwrap();
        t.update("a", 5, Some(10)).unwrap();
        assert_eq!(reader.snapshot("a").unwrap().processed_lines, 5);
    }

    #[test]
    fn concurrent_readers_see_monotonic_progress() {
        let t = tracker();
        t.start("a").unwrap();
        let reader = t.clone();
        let handle = std::thread::spawn(move || {
            let mut last = 0;
            for _ in 0..1000 {
                if let Some(s) = reader.snapshot("a") {
                    assert!(s.processed_lines >= last);
                    last = s.processed_lines;
                }
            }
        });
        for i in 0..=1000u64 {
            t.update("a", i, Some(1000)).unwrap();
        }
        handle.join().unwrap();
        assert_eq!(t.snapshot("a").unwrap().progress_percent(), Some(100));
    }
}
