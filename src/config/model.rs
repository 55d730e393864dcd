//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for the scheduler lock.
///
/// This struct represents the contents of `schedlock.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Storage settings
    // =========================================================================
    /// Path to the SQLite database holding the lock rows.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// How long a connection waits on a write held by another process.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Minutes after which a `running` lock may be taken over.
    #[serde(default = "default_lock_stale_minutes")]
    pub lock_stale_minutes: u32,

    /// Acquisition attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait before the second attempt; doubles on every further attempt.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound of the random jitter added to every wait.
    #[serde(default = "default_retry_max_jitter_ms")]
    pub retry_max_jitter_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            lock_stale_minutes: default_lock_stale_minutes(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_jitter_ms: default_retry_max_jitter_ms(),
        }
    }
}
