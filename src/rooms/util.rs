//! Small helpers shared by every room implementation.

use chrono::Utc;

/// Milliseconds since the Unix epoch, the timestamp unit [`crate::protocol::ChatMessage`] uses.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
