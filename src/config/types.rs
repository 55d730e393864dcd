//! Configuration constants and default value functions.

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "schedlock.yaml";

// Default value functions for serde
pub(crate) fn default_database_path() -> String {
    "schedlock.db".to_string()
}
pub(crate) fn default_lock_stale_minutes() -> u32 {
    5
}
pub(crate) fn default_max_retries() -> u32 {
    3
}
pub(crate) fn default_retry_base_delay_ms() -> u64 {
    500
}
pub(crate) fn default_retry_max_jitter_ms() -> u64 {
    200
}
pub(crate) fn default_busy_timeout_ms() -> u64 {
    5000
}
