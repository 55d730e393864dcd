//! schedlock: per-consultant scheduler lock for multi-instance journey batches.
//!
//! Scheduler replicas share one lock store. Before running a consultant's
//! nightly email/WhatsApp batch an instance calls
//! [`locks::SchedulerLock::acquire`]; it skips the run when that returns
//! `false`, and calls [`locks::SchedulerLock::release`] when the batch ends,
//! whether it succeeded or not.
//!
//! ```no_run
//! use schedlock::locks::SchedulerLock;
//! use schedlock::store::SqliteLockStore;
//!
//! let store = SqliteLockStore::open("schedlock.db".as_ref())?;
//! let lock = SchedulerLock::new(store);
//! lock.provision("C1")?;
//!
//! if let Some(_guard) = lock.lock("C1")? {
//!     // run the batch; the guard releases the lock when it goes out of scope
//! }
//! # Ok::<(), schedlock::error::SchedlockError>(())
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod locks;
pub mod store;

#[cfg(test)]
mod test_support;
