//! Logical file-name handling for run registration.
//!
//! A requested name is reduced to its final path component. When that name
//! is already registered, a timestamp suffix is inserted before the
//! extension (`access.log` → `access_20240101120000.log`), followed by a
//! counter if the timestamped name is taken as well.

use anyhow::{bail, Result};
use chrono::NaiveDateTime;

/// Strip directory components and surrounding whitespace.
pub fn sanitize_name(requested: &str) -> Result<String> {
    let last = requested
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        bail!("invalid file name: '{}'", requested);
    }
    Ok(last.to_string())
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}

/// Candidate names in preference order: the name itself, then the
/// timestamped variant, then numbered timestamped variants.
pub fn candidates(name: &str, now: NaiveDateTime) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = split_extension(name);
    let stamp = now.format("%Y%m%d%H%M%S").to_string();
    std::iter::once(name.to_string())
        .chain(std::iter::once(format!("{}_{}{}", stem, stamp, ext)))
        .chain((2u32..).map(move |n| format!("{}_{}_{}{}", stem, stamp, n, ext)))
}

/// First candidate for which `is_taken` returns `false`.
pub fn resolve_unique(name: &str, now: NaiveDateTime, mut is_taken: impl FnMut(&str) -> bool) -> String {
    candidates(name, now)
        .find(|c| !is_taken(c))
        .unwrap_or_else(|| name.to_string())
}
