//! Storage backends for scheduler lock rows.
//!
//! A [`LockStore`] owns one row per consultant and must evaluate the acquire
//! guard and the write as one atomic step, so two acquirers can never both
//! observe "idle" and both succeed. Stores are clock-free: callers pass `now`
//! and the staleness cut-off in every request.
//!
//! - [`SqliteLockStore`]: persistent, shared across processes.
//! - [`MemoryLockStore`]: a mutex-guarded map for embedding and tests. It
//!   only coordinates callers inside one process.

mod memory;
mod sqlite;

pub use memory::MemoryLockStore;
pub use sqlite::SqliteLockStore;

use crate::error::Result;
use crate::events::Event;
use crate::locks::{FenceToken, LockHolder, LockRecord};
use chrono::{DateTime, Utc};

/// Inputs of one acquire attempt.
#[derive(Debug, Clone)]
pub struct AcquireRequest<'a> {
    /// Lock key.
    pub consultant_id: &'a str,

    /// Written to `updated_at` on success.
    pub now: DateTime<Utc>,

    /// A `running` row last written before this instant may be taken over.
    pub stale_before: DateTime<Utc>,

    /// Written to the holder columns on success.
    pub holder: &'a LockHolder,

    /// Written to the fence token column on success.
    pub token: &'a FenceToken,
}

/// Result of one acquire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The row was idle or never initialised.
    Acquired,

    /// The row was `running` but stale; ownership moved to the caller.
    TakenOver {
        /// The row as it was before the takeover.
        previous: LockRecord,
    },

    /// A live owner holds the row. Nothing was written.
    Busy {
        /// The row as observed by the failed attempt.
        current: LockRecord,
    },

    /// No row exists for this consultant. Nothing was written.
    Missing,
}

impl AcquireOutcome {
    /// Whether the caller now holds the lock.
    pub fn is_acquired(&self) -> bool {
        matches!(
            self,
            AcquireOutcome::Acquired | AcquireOutcome::TakenOver { .. }
        )
    }
}

/// The conditional-update primitive the scheduler lock is built on.
pub trait LockStore {
    /// Create an idle row for `consultant_id` if none exists.
    ///
    /// Returns `true` when a row was created.
    fn provision(&self, consultant_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Set the row to `running` if it is unset, idle, or stale, atomically.
    fn try_acquire(&self, request: &AcquireRequest<'_>) -> Result<AcquireOutcome>;

    /// Set the row to idle unconditionally.
    ///
    /// Returns `false` when no row exists; that is not an error.
    fn release(&self, consultant_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Set the row to idle only while it is `running` with `token`.
    fn release_if_token(
        &self,
        consultant_id: &str,
        token: &FenceToken,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Set the row to idle only if it still matches `observed`.
    ///
    /// Status, `updated_at` and fence token must all be unchanged, so an
    /// acquire that landed after `observed` was read is never wiped.
    fn clear_if_unchanged(&self, observed: &LockRecord, now: DateTime<Utc>) -> Result<bool>;

    /// Read one row.
    fn get(&self, consultant_id: &str) -> Result<Option<LockRecord>>;

    /// Read all rows ordered by consultant ID.
    fn list(&self) -> Result<Vec<LockRecord>>;

    /// Append an audit event.
    fn append_event(&self, event: &Event) -> Result<()>;

    /// Most recent events first, optionally for one consultant.
    fn list_events(&self, consultant_id: Option<&str>, limit: usize) -> Result<Vec<Event>>;
}

macro_rules! forward_lock_store {
    ($($ty:ty),*) => {$(
        impl<S: LockStore + ?Sized> LockStore for $ty {
            fn provision(&self, consultant_id: &str, now: DateTime<Utc>) -> Result<bool> {
                (**self).provision(consultant_id, now)
            }

            fn try_acquire(&self, request: &AcquireRequest<'_>) -> Result<AcquireOutcome> {
                (**self).try_acquire(request)
            }

            fn release(&self, consultant_id: &str, now: DateTime<Utc>) -> Result<bool> {
                (**self).release(consultant_id, now)
            }

            fn release_if_token(
                &self,
                consultant_id: &str,
                token: &FenceToken,
                now: DateTime<Utc>,
            ) -> Result<bool> {
                (**self).release_if_token(consultant_id, token, now)
            }

            fn clear_if_unchanged(
                &self,
                observed: &LockRecord,
                now: DateTime<Utc>,
            ) -> Result<bool> {
                (**self).clear_if_unchanged(observed, now)
            }

            fn get(&self, consultant_id: &str) -> Result<Option<LockRecord>> {
                (**self).get(consultant_id)
            }

            fn list(&self) -> Result<Vec<LockRecord>> {
                (**self).list()
            }

            fn append_event(&self, event: &Event) -> Result<()> {
                (**self).append_event(event)
            }

            fn list_events(&self, consultant_id: Option<&str>, limit: usize) -> Result<Vec<Event>> {
                (**self).list_events(consultant_id, limit)
            }
        }
    )*};
}

// Several lock handles (one per simulated instance) can share one store.
forward_lock_store!(&S, std::sync::Arc<S>);
