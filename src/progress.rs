//! Ingest progress reporting for the CLI.
//!
//! `logsift ingest` polls the run's status and hands each change to a
//! [`ProgressReporter`]. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

use crate::status::StatusResponse;

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, file_name: &str, status: &StatusResponse);
}

/// Human-friendly progress: "ingest access.log  processing  1,200 / 5,000 lines (24%)".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, file_name: &str, status: &StatusResponse) {
        let line = match status {
            StatusResponse::Processing {
                total: 0,
                processed,
                ..
            } => format!(
                "ingest {}  scanning  {} lines\n",
                file_name,
                format_number(*processed)
            ),
            StatusResponse::Processing {
                progress,
                total,
                processed,
            } => format!(
                "ingest {}  processing  {} / {} lines ({}%)\n",
                file_name,
                format_number(*processed),
                format_number(*total),
                progress
            ),
            StatusResponse::Completed {
                processed,
                accepted,
                ..
            } => format!(
                "ingest {}  completed  {} lines, {} records\n",
                file_name,
                format_number(*processed),
                format_number(*accepted)
            ),
            StatusResponse::Error { error } => {
                format!("ingest {}  error  {}\n", file_name, error)
            }
            StatusResponse::Unknown => format!("ingest {}  unknown\n", file_name),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, file_name: &str, status: &StatusResponse) {
        let mut obj = match serde_json::to_value(status) {
            Ok(v) => v,
            Err(_) => return,
        };
        if let Some(map) = obj.as_object_mut() {
            map.insert("event".into(), "progress".into());
            map.insert("file_name".into(), file_name.into());
        }
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _file_name: &str, _status: &StatusResponse) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
