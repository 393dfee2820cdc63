//! Utility functions for dates, string handling, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Calendar-day resolution in the newspapers' home time zone
//! - String truncation for logging and LLM response cleanup
//! - Filename normalisation for source matching
//! - File system validation for output directories

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Today's date at a fixed UTC offset (in minutes).
///
/// Editions are dated by where they are printed, not by where the job
/// runs, so "today" is always evaluated in the configured offset. An
/// out-of-range offset falls back to UTC.
pub fn today_at_offset(offset_minutes: i32) -> NaiveDate {
    let offset = FixedOffset::east_opt(offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix());
    let today = Utc::now().with_timezone(&offset).date_naive();
    debug!(%today, offset_minutes, "Resolved today's date");
    today
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Cut `text` down to at most `max` characters.
///
/// Returns the original character count when anything was removed.
pub fn truncate_chars(text: &mut String, max: usize) -> Option<usize> {
    let (cut, _) = text.char_indices().nth(max)?;
    let original = text.chars().count();
    text.truncate(cut);
    Some(original)
}

/// Strip a Markdown code fence the model may wrap around its JSON.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Lowercase and drop spaces, hyphens and underscores.
///
/// Used to match edition filenames like `The-Hindu_Bengaluru.txt` against
/// keywords like `thehindubengaluru`.
pub fn normalise_name(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect()
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
