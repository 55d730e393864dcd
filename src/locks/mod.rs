//! Scheduler lock for journey batches.
//!
//! Guarantees that only one scheduler instance runs a consultant's nightly
//! email/WhatsApp batch at a time, without a separate coordination service.
//!
//! # Lock Rows
//!
//! Each consultant has one row in the shared [`crate::store::LockStore`]:
//! - `status`: `idle`, `running`, or unset (treated as idle)
//! - `updated_at`: last write; doubles as "acquired at" while running
//! - `holder` / `pid`: who acquired it (informational)
//! - `fence_token`: written by every acquire
//!
//! # Acquire
//!
//! An attempt is one atomic conditional write that moves the row to
//! `running` if it is unset, idle, or running but older than the staleness
//! threshold (5 minutes by default). A failed attempt is followed by a
//! jittered exponential wait (500ms, 1s, 2s, ... plus up to 200ms). After the
//! last attempt `acquire` returns `false` and the caller skips this run.
//!
//! # Stale Takeover
//!
//! A stale `running` row is assumed to belong to a crashed holder and is taken
//! over. Work that legitimately runs longer than the threshold can therefore
//! execute twice.
//!
//! # Release
//!
//! `release` sets the row idle unconditionally. A holder that was merely slow
//! and got taken over can clear the new holder's lock this way.
//! `acquire_fenced`/`release_fenced` and [`SchedulerLockGuard`] compare the
//! fence token first and refuse in that case.

mod backoff;
mod guard;
mod holder;
mod operations;
mod types;


pub use backoff::RetryPolicy;
pub use guard::SchedulerLockGuard;
pub(crate) use holder::get_owner_string;
pub use holder::{LockHolder, format_age};
pub use operations::{DEFAULT_STALE_MINUTES, SchedulerLock};
pub use types::{FenceToken, LockInfo, LockRecord, LockStatus};
