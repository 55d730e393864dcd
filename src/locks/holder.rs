//! Lock holder identity and age formatting.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Who wrote the last successful acquire.
///
/// Informational only: acquisition and release never compare holders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    /// Owner of the lock (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the lock holder (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl LockHolder {
    /// Holder describing the current process.
    pub fn current() -> Self {
        Self {
            owner: get_owner_string(),
            pid: Some(std::process::id()),
        }
    }

    /// Holder with an explicit owner name and no PID.
    pub fn named(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            pid: None,
        }
    }
}

impl std::fmt::Display for LockHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "{} (pid {})", self.owner, pid),
            None => write!(f, "{}", self.owner),
        }
    }
}

/// Format an age as a human-readable string.
pub fn format_age(age: Duration) -> String {
    let seconds = age.num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Get the `user@host` string used for holders and event actors.
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
