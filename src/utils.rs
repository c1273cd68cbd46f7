//! Common utilities shared across modules.

use chrono::Utc;

/// Get current UTC timestamp in seconds since UNIX_EPOCH.
pub fn get_utc_timestamp() -> u64 {
    Utc::now().timestamp() as u64
}
