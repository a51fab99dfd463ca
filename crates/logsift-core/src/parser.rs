//! Access-log line parser.
//!
//! Recognizes the combined log format extended with a trailing response
//! time:
//!
//! ```text
//! <client> <logname> <user> [<timestamp>] "<method> <resource> <protocol>" <status> <bytes> "<referrer>" "<user agent>" <seconds>
//! ```
//!
//! Parsing is pure and never fails loudly: a line that does not match the
//! grammar, or whose status / response time is not numeric, yields `None`.
//!
//! # Example
//!
//! ```rust
//! use logsift_core::parser::parse_line;
//!
//! let line = r#"10.0.0.1 - - [10/Oct/2023:13:55:36 -0700] "GET /api/x HTTP/1.1" 200 1234 "-" "curl/7.68" 0.045"#;
//! let record = parse_line(line).unwrap();
//! assert_eq!(record.status_code, 200);
//! assert_eq!(record.resource, "/api/x");
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::models::LogRecord;

const LINE_PATTERN: &str = concat!(
    r#"^(\S+) (\S+) (\S+) "#,
    r#"\[([\w:/]+\s[+\-]\d{4})\] "#,
    r#""(\S+) (\S+) (\S+)" "#,
    r#"(\d+) (\S+) "#,
    r#""([^"]*)" "([^"]*)" "#,
    r#"(\S+)$"#,
);

fn line_regex() -> &'static Regex {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    LINE_RE.get_or_init(|| Regex::new(LINE_PATTERN).expect("access log pattern compiles"))
}

/// Parse one raw line into a [`LogRecord`].
///
/// Surrounding whitespace (including a trailing `\r`) is ignored.
pub fn parse_line(line: &str) -> Option<LogRecord> {
    let caps = line_regex().captures(line.trim())?;

    let status_code = caps[8].parse::<i64>().ok()?;
    let response_time_seconds = caps[12].parse::<f64>().ok()?;

    Some(LogRecord {
        source_client: caps[1].to_string(),
        remote_log_name: caps[2].to_string(),
        user_id: caps[3].to_string(),
        timestamp: caps[4].to_string(),
        method: caps[5].to_string(),
        resource: caps[6].to_string(),
        protocol: caps[7].to_string(),
        status_code,
        byte_count: caps[9].to_string(),
        referrer: caps[10].to_string(),
        user_agent: caps[11].to_string(),
        response_time_seconds,
    })
}
