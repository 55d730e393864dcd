//! Lock state, record, and information structures.

use super::holder::{LockHolder, format_age};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stored scheduler status of a consultant's lock row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// No batch is running.
    Idle,
    /// A batch holds the lock (or held it and never released).
    Running,
}

impl LockStatus {
    /// Column value for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Idle => "idle",
            LockStatus::Running => "running",
        }
    }

    /// Parse a stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            _ => None,
        }
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque value written by every successful acquire.
///
/// Only [`super::SchedulerLock::release_fenced`] compares it; a plain
/// `release` ignores it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FenceToken(String);

impl FenceToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        let value: u128 = rand::random();
        Self(format!("{:032x}", value))
    }

    /// Wrap a token previously handed out by `acquire_fenced`.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FenceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One consultant's lock row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Tenant owning the lock.
    pub consultant_id: String,

    /// Stored status; `None` means never initialised and counts as idle.
    pub status: Option<LockStatus>,

    /// Last write to the row. Doubles as "acquired at" while running.
    pub updated_at: DateTime<Utc>,

    /// Last acquirer, cleared on release.
    pub holder: Option<LockHolder>,

    /// Token of the last acquire, cleared on release.
    pub fence_token: Option<FenceToken>,
}

impl LockRecord {
    /// A freshly provisioned idle row.
    pub fn idle(consultant_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            consultant_id: consultant_id.into(),
            status: Some(LockStatus::Idle),
            updated_at: now,
            holder: None,
            fence_token: None,
        }
    }

    /// Whether the stored status is `running`, stale or not.
    pub fn is_running(&self) -> bool {
        self.status == Some(LockStatus::Running)
    }

    /// Whether the row is `running` and was last written before `stale_before`.
    pub fn is_stale_at(&self, stale_before: DateTime<Utc>) -> bool {
        self.is_running() && self.updated_at < stale_before
    }

    /// Whether the acquire guard would match this row.
    pub fn is_acquirable_at(&self, stale_before: DateTime<Utc>) -> bool {
        !self.is_running() || self.is_stale_at(stale_before)
    }

    /// Time since the last write.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.updated_at)
    }
}

/// A lock record with staleness computed for display.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// The stored record.
    pub record: LockRecord,

    /// Whether a new acquire would take the lock over.
    pub is_stale: bool,

    /// Age of the record when this info was built.
    pub age: Duration,
}

impl LockInfo {
    /// Build display info for `record` as seen at `now`.
    pub fn new(record: LockRecord, stale_after: Duration, now: DateTime<Utc>) -> Self {
        let is_stale = record.is_stale_at(now - stale_after);
        let age = record.age(now);
        Self {
            record,
            is_stale,
            age,
        }
    }

    /// Stored status, with an uninitialised row shown as idle.
    pub fn status(&self) -> LockStatus {
        self.record.status.unwrap_or(LockStatus::Idle)
    }

    /// Age formatted for humans.
    pub fn age_string(&self) -> String {
        format_age(self.age)
    }
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, holder: {}, age: {}{})",
            self.record.consultant_id,
            self.status(),
            self.record
                .holder
                .as_ref()
                .map(|h| h.owner.as_str())
                .unwrap_or("-"),
            self.age_string(),
            if self.is_stale { ", STALE" } else { "" }
        )
    }
}
