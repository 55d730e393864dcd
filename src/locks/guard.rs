//! RAII lock guard implementation.

use super::operations::SchedulerLock;
use super::types::FenceToken;
use crate::error::Result;
use crate::store::LockStore;
use tracing::warn;

/// RAII guard for a held scheduler lock.
///
/// When dropped, the lock is released with its fence token, so a guard whose
/// lock was taken over cannot clear the new holder's lock. If the release
/// fails, a warning is logged but no panic occurs; the row then stays
/// `running` until it goes stale.
pub struct SchedulerLockGuard<'a, S: LockStore> {
    lock: &'a SchedulerLock<S>,
    consultant_id: String,
    token: FenceToken,

    /// Whether the lock has been released manually.
    released: bool,
}

impl<'a, S: LockStore> SchedulerLockGuard<'a, S> {
    pub(super) fn new(lock: &'a SchedulerLock<S>, consultant_id: String, token: FenceToken) -> Self {
        Self {
            lock,
            consultant_id,
            token,
            released: false,
        }
    }

    /// The consultant whose lock is held.
    pub fn consultant_id(&self) -> &str {
        &self.consultant_id
    }

    /// The fence token written by the acquire.
    pub fn token(&self) -> &FenceToken {
        &self.token
    }

    /// Manually release the lock and report the outcome.
    ///
    /// Returns `false` when the lock had been taken over in the meantime.
    pub fn release(mut self) -> Result<bool> {
        self.released = true;
        self.lock.release_fenced(&self.consultant_id, &self.token)
    }
}

impl<S: LockStore> std::fmt::Debug for SchedulerLockGuard<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerLockGuard")
            .field("consultant_id", &self.consultant_id)
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}

impl<S: LockStore> Drop for SchedulerLockGuard<'_, S> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.lock.release_fenced(&self.consultant_id, &self.token)
        {
            warn!(
                consultant_id = %self.consultant_id,
                error = %e,
                "failed to release scheduler lock"
            );
        }
    }
}
