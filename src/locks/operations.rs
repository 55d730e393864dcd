//! Lock acquisition, release, inspection, and clearing.

use super::backoff::RetryPolicy;
use super::guard::SchedulerLockGuard;
use super::holder::{LockHolder, format_age};
use super::types::{FenceToken, LockInfo};
use crate::config::Config;
use crate::error::{Result, SchedlockError};
use crate::events::{Event, EventAction};
use crate::store::{AcquireOutcome, AcquireRequest, LockStore};
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

/// Default staleness threshold for a `running` lock.
pub const DEFAULT_STALE_MINUTES: i64 = 5;

/// Per-consultant scheduler lock over a [`LockStore`].
///
/// Each handle represents one scheduler instance. Handles in different
/// processes coordinate only through the store they share.
#[derive(Debug)]
pub struct SchedulerLock<S: LockStore> {
    store: S,
    policy: RetryPolicy,
    stale_after: Duration,
    holder: LockHolder,
}

impl<S: LockStore> SchedulerLock<S> {
    /// Lock with the default retry policy, a 5 minute staleness threshold,
    /// and the current process as holder.
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
            stale_after: Duration::minutes(DEFAULT_STALE_MINUTES),
            holder: LockHolder::current(),
        }
    }

    /// Lock configured from a [`Config`].
    pub fn from_config(store: S, config: &Config) -> Self {
        Self::new(store)
            .with_retry_policy(config.retry_policy())
            .with_stale_after(config.stale_after())
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the staleness threshold.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Replace the holder recorded on acquire.
    pub fn with_holder(mut self, holder: LockHolder) -> Self {
        self.holder = holder;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The retry policy used by [`Self::acquire`].
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Age after which a `running` lock may be taken over.
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Create the idle lock row for a consultant if it does not exist yet.
    pub fn provision(&self, consultant_id: &str) -> Result<bool> {
        validate_consultant_id(consultant_id)?;

        let created = self.store.provision(consultant_id, Utc::now())?;
        if created {
            info!(consultant_id, "provisioned scheduler lock");
            self.record_event(Event::new(EventAction::Provision, consultant_id));
        }
        Ok(created)
    }

    /// Acquire the lock using the configured number of attempts.
    ///
    /// Returns `false` when a live owner held the lock for every attempt.
    /// Storage failures are returned as errors; treat them as "not acquired".
    pub fn acquire(&self, consultant_id: &str) -> Result<bool> {
        self.acquire_with_retries(consultant_id, self.policy.max_retries)
    }

    /// Acquire the lock with an explicit number of attempts (at least 1).
    pub fn acquire_with_retries(&self, consultant_id: &str, max_retries: u32) -> Result<bool> {
        Ok(self.acquire_token(consultant_id, max_retries)?.is_some())
    }

    /// Acquire the lock and return the token required by [`Self::release_fenced`].
    pub fn acquire_fenced(&self, consultant_id: &str) -> Result<Option<FenceToken>> {
        self.acquire_token(consultant_id, self.policy.max_retries)
    }

    /// Acquire the lock and wrap it in a guard that releases on drop.
    pub fn lock(&self, consultant_id: &str) -> Result<Option<SchedulerLockGuard<'_, S>>> {
        Ok(self
            .acquire_fenced(consultant_id)?
            .map(|token| SchedulerLockGuard::new(self, consultant_id.to_string(), token)))
    }

    fn acquire_token(&self, consultant_id: &str, max_retries: u32) -> Result<Option<FenceToken>> {
        validate_consultant_id(consultant_id)?;
        if max_retries == 0 {
            return Err(SchedlockError::UserError(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        let mut rng = rand::thread_rng();

        for attempt in 0..max_retries {
            let now = Utc::now();
            let token = FenceToken::generate();
            let request = AcquireRequest {
                consultant_id,
                now,
                stale_before: now - self.stale_after,
                holder: &self.holder,
                token: &token,
            };

            match self.store.try_acquire(&request)? {
                AcquireOutcome::Acquired => {
                    info!(
                        consultant_id,
                        attempt = attempt + 1,
                        "scheduler lock acquired"
                    );
                    self.record_event(Event::new(EventAction::Acquire, consultant_id).with_details(
                        json!({
                            "attempt": attempt + 1,
                            "holder": self.holder.owner,
                            "pid": self.holder.pid,
                        }),
                    ));
                    return Ok(Some(token));
                }
                AcquireOutcome::TakenOver { previous } => {
                    let age = previous.age(now);
                    let previous_holder = previous
                        .holder
                        .as_ref()
                        .map(|h| h.to_string())
                        .unwrap_or_else(|| "unknown".to_string());
                    info!(
                        consultant_id,
                        previous_holder = %previous_holder,
                        stale_for = %format_age(age),
                        "took over stale scheduler lock; previous run likely crashed"
                    );
                    self.record_event(
                        Event::new(EventAction::Takeover, consultant_id).with_details(json!({
                            "attempt": attempt + 1,
                            "holder": self.holder.owner,
                            "pid": self.holder.pid,
                            "previous_holder": previous.holder.as_ref().map(|h| h.owner.clone()),
                            "previous_pid": previous.holder.as_ref().and_then(|h| h.pid),
                            "age_seconds": age.num_seconds(),
                        })),
                    );
                    return Ok(Some(token));
                }
                AcquireOutcome::Busy { current } => {
                    debug!(
                        consultant_id,
                        attempt = attempt + 1,
                        max_retries,
                        holder = ?current.holder.as_ref().map(|h| h.owner.as_str()),
                        age = %format_age(current.age(now)),
                        "scheduler lock busy"
                    );
                }
                AcquireOutcome::Missing => {
                    if attempt == 0 {
                        warn!(consultant_id, "no scheduler lock row; provision it first");
                    }
                }
            }

            if attempt + 1 < max_retries {
                let delay = self.policy.delay_for(attempt, &mut rng);
                debug!(
                    consultant_id,
                    delay_ms = delay.as_millis() as u64,
                    next_attempt = attempt + 2,
                    "waiting before retrying scheduler lock"
                );
                std::thread::sleep(delay);
            }
        }

        warn!(
            consultant_id,
            max_retries, "scheduler lock not acquired; another instance is running"
        );
        Ok(None)
    }

    /// Set the lock idle unconditionally.
    ///
    /// Idempotent. A holder whose lock was taken over can still clear it here;
    /// use [`Self::release_fenced`] to rule that out.
    pub fn release(&self, consultant_id: &str) -> Result<()> {
        validate_consultant_id(consultant_id)?;

        let existed = self.store.release(consultant_id, Utc::now())?;
        if existed {
            info!(consultant_id, "scheduler lock released");
            self.record_event(
                Event::new(EventAction::Release, consultant_id)
                    .with_details(json!({ "fenced": false })),
            );
        } else {
            debug!(consultant_id, "release of unprovisioned scheduler lock ignored");
        }
        Ok(())
    }

    /// Set the lock idle only if `token` is still the current holder's token.
    ///
    /// Returns `false`, and leaves the row untouched, when the lock was taken
    /// over or already released.
    pub fn release_fenced(&self, consultant_id: &str, token: &FenceToken) -> Result<bool> {
        validate_consultant_id(consultant_id)?;

        let released = self
            .store
            .release_if_token(consultant_id, token, Utc::now())?;
        if released {
            info!(consultant_id, "scheduler lock released");
            self.record_event(
                Event::new(EventAction::Release, consultant_id)
                    .with_details(json!({ "fenced": true })),
            );
        } else {
            warn!(
                consultant_id,
                "fenced release refused; lock was taken over or already released"
            );
            self.record_event(
                Event::new(EventAction::ReleaseRejected, consultant_id)
                    .with_details(json!({ "fence_token": token.as_str() })),
            );
        }
        Ok(released)
    }

    /// Current state of one consultant's lock.
    pub fn inspect(&self, consultant_id: &str) -> Result<Option<LockInfo>> {
        validate_consultant_id(consultant_id)?;

        let now = Utc::now();
        Ok(self
            .store
            .get(consultant_id)?
            .map(|record| LockInfo::new(record, self.stale_after, now)))
    }

    /// Current state of every lock, ordered by consultant ID.
    pub fn list(&self) -> Result<Vec<LockInfo>> {
        let now = Utc::now();
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|record| LockInfo::new(record, self.stale_after, now))
            .collect())
    }

    /// Operator override: set the lock idle and return what it looked like.
    ///
    /// The row is only cleared if it still matches the state that is returned.
    /// Fails with a user error when the consultant has no lock row, and with a
    /// lock error when another instance wrote the row in between.
    pub fn clear(&self, consultant_id: &str) -> Result<LockInfo> {
        let Some(before) = self.inspect(consultant_id)? else {
            return Err(SchedlockError::UserError(format!(
                "no scheduler lock exists for consultant '{}'",
                consultant_id
            )));
        };

        if !self.store.clear_if_unchanged(&before.record, Utc::now())? {
            warn!(
                consultant_id,
                "scheduler lock changed while clearing; left untouched"
            );
            return Err(SchedlockError::LockError(format!(
                "lock for consultant '{}' changed while it was being cleared; \
                 nothing was changed. Check `schedlock status {}` and retry.",
                consultant_id, consultant_id
            )));
        }

        warn!(
            consultant_id,
            was_stale = before.is_stale,
            "scheduler lock cleared by operator"
        );
        self.record_event(Event::new(EventAction::Clear, consultant_id).with_details(json!({
            "status": before.status().as_str(),
            "was_stale": before.is_stale,
            "age_seconds": before.age.num_seconds(),
            "holder": before.record.holder.as_ref().map(|h| h.owner.clone()),
        })));
        Ok(before)
    }

    /// Most recent lock events, optionally for one consultant.
    pub fn events(&self, consultant_id: Option<&str>, limit: usize) -> Result<Vec<Event>> {
        self.store.list_events(consultant_id, limit)
    }

    /// Append `event` to the audit log with this handle's holder as actor.
    ///
    /// Best effort: a failed write is logged and otherwise ignored.
    pub fn record_event(&self, event: Event) {
        let event = event.with_actor(self.holder.owner.clone());
        if let Err(e) = self.store.append_event(&event) {
            warn!(
                consultant_id = %event.consultant_id,
                action = %event.action,
                error = %e,
                "failed to record lock event"
            );
        }
    }
}

fn validate_consultant_id(consultant_id: &str) -> Result<()> {
    if consultant_id.trim().is_empty() {
        return Err(SchedlockError::UserError(
            "consultant id must not be empty".to_string(),
        ));
    }
    Ok(())
}
