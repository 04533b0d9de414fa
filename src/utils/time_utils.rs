//! Timestamp formatting for run identifiers and artifact names

use chrono::{DateTime, Utc};

/// Format a timestamp as a filesystem-safe identifier.
///
/// Second precision, UTC, with `:` replaced by `-`, e.g. `2025-03-01T08-15-00`.
/// Used for run ids, run directory names and screenshot file names.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// Human-readable form used in page watermarks.
#[must_use]
pub fn format_display_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
