//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// RFC 3339 timestamp, or "N/A" when the event never happened
pub fn format_optional(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "N/A".to_string())
}
