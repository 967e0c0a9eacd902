//! Human-readable sizes and timestamps.

use chrono::{DateTime, Utc};

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formats a byte count with two decimals, e.g. `1.50 KB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", SIZE_UNITS[unit])
}

/// Formats an optional byte count, falling back to `N/A`.
#[must_use]
pub fn format_optional_bytes(bytes: Option<u64>) -> String {
    bytes.map_or_else(|| "N/A".to_string(), format_bytes)
}

/// Describes how long ago `then` was relative to `now`.
///
/// Months are 30 days and years 365 days; anything older than a month is
/// prefixed with "about".
#[must_use]
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(then).num_seconds();

    if secs < 60 {
        return "just now".to_string();
    }
    if secs < 3_600 {
        return format!("{} ago", plural(secs / 60, "minute"));
    }
    if secs < 86_400 {
        return format!("{} ago", plural(secs / 3_600, "hour"));
    }
    if secs < 2_592_000 {
        return format!("{} ago", plural(secs / 86_400, "day"));
    }
    if secs < 31_536_000 {
        return format!("about {} ago", plural(secs / 2_592_000, "month"));
    }
    format!("about {} ago", plural(secs / 31_536_000, "year"))
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
