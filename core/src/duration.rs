//! Elapsed-time arithmetic and `HH:MM:SS` rendering.

use chrono::{DateTime, Utc};

/// Rendering of a zero duration, shown whenever no timer is active.
pub const ZERO_DURATION: &str = "00:00:00";

/// Formats whole seconds as `HH:MM:SS`.
///
/// Fields are zero-padded to two digits. Hours are not wrapped at 24 and grow
/// past two digits when needed.
pub fn format_duration(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Whole seconds between `started_at` and `now`, floored.
///
/// A start in the future (server clock ahead of ours) counts as zero.
pub fn elapsed_seconds(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (now - started_at).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    (millis / 1000) as u64
}
