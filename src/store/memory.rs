//! In-process lock store.

use super::{AcquireOutcome, AcquireRequest, LockStore};
use crate::error::{Result, SchedlockError};
use crate::events::Event;
use crate::locks::{FenceToken, LockRecord, LockStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    locks: BTreeMap<String, LockRecord>,
    events: Vec<Event>,
}

/// Lock store kept in process memory.
///
/// Every operation runs under one mutex, which makes the acquire guard atomic
/// for threads of this process. Other processes cannot see it; use
/// [`super::SqliteLockStore`] to coordinate replicas.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    state: Mutex<MemoryState>,
}

impl MemoryLockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| {
            SchedlockError::StorageError("memory lock store mutex poisoned".to_string())
        })
    }
}

impl LockStore for MemoryLockStore {
    fn provision(&self, consultant_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state()?;
        if state.locks.contains_key(consultant_id) {
            return Ok(false);
        }
        state
            .locks
            .insert(consultant_id.to_string(), LockRecord::idle(consultant_id, now));
        Ok(true)
    }

    fn try_acquire(&self, request: &AcquireRequest<'_>) -> Result<AcquireOutcome> {
        let mut state = self.state()?;
        let Some(record) = state.locks.get_mut(request.consultant_id) else {
            return Ok(AcquireOutcome::Missing);
        };

        if !record.is_acquirable_at(request.stale_before) {
            return Ok(AcquireOutcome::Busy {
                current: record.clone(),
            });
        }

        let previous = record.clone();
        record.status = Some(LockStatus::Running);
        record.updated_at = request.now;
        record.holder = Some(request.holder.clone());
        record.fence_token = Some(request.token.clone());

        Ok(if previous.is_running() {
            AcquireOutcome::TakenOver { previous }
        } else {
            AcquireOutcome::Acquired
        })
    }

    fn release(&self, consultant_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state()?;
        match state.locks.get_mut(consultant_id) {
            Some(record) => {
                set_idle(record, now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn release_if_token(
        &self,
        consultant_id: &str,
        token: &FenceToken,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state()?;
        match state.locks.get_mut(consultant_id) {
            Some(record) if record.is_running() && record.fence_token.as_ref() == Some(token) => {
                set_idle(record, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn clear_if_unchanged(&self, observed: &LockRecord, now: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state()?;
        match state.locks.get_mut(&observed.consultant_id) {
            Some(record)
                if record.status == observed.status
                    && record.updated_at == observed.updated_at
                    && record.fence_token == observed.fence_token =>
            {
                set_idle(record, now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get(&self, consultant_id: &str) -> Result<Option<LockRecord>> {
        Ok(self.state()?.locks.get(consultant_id).cloned())
    }

    fn list(&self) -> Result<Vec<LockRecord>> {
        Ok(self.state()?.locks.values().cloned().collect())
    }

    fn append_event(&self, event: &Event) -> Result<()> {
        self.state()?.events.push(event.clone());
        Ok(())
    }

    fn list_events(&self, consultant_id: Option<&str>, limit: usize) -> Result<Vec<Event>> {
        let state = self.state()?;
        Ok(state
            .events
            .iter()
            .rev()
            .filter(|e| consultant_id.is_none_or(|id| e.consultant_id == id))
            .take(limit)
            .cloned()
            .collect())
    }
}

fn set_idle(record: &mut LockRecord, now: DateTime<Utc>) {
    record.status = Some(LockStatus::Idle);
    record.updated_at = now;
    record.holder = None;
    record.fence_token = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventAction;
    use crate::locks::LockHolder;
    use chrono::Duration;

    #[test]
    fn acquire_follows_the_same_guard_as_sqlite() {
        let store = MemoryLockStore::new();
        let now = Utc::now();
        let holder = LockHolder::named("a@host");
        let token = FenceToken::new("a");
        let request = |at: DateTime<Utc>| AcquireRequest {
            consultant_id: "C1",
            now: at,
            stale_before: at - Duration::minutes(5),
            holder: &holder,
            token: &token,
        };

        assert_eq!(
            store.try_acquire(&request(now)).unwrap(),
            AcquireOutcome::Missing
        );

        store.provision("C1", now).unwrap();
        assert_eq!(
            store.try_acquire(&request(now)).unwrap(),
            AcquireOutcome::Acquired
        );
        assert!(matches!(
            store.try_acquire(&request(now + Duration::minutes(4))).unwrap(),
            AcquireOutcome::Busy { .. }
        ));
        assert!(matches!(
            store.try_acquire(&request(now + Duration::minutes(6))).unwrap(),
            AcquireOutcome::TakenOver { .. }
        ));
    }

    #[test]
    fn fenced_release_needs_the_current_token() {
        let store = MemoryLockStore::new();
        let now = Utc::now();
        store.provision("C1", now).unwrap();

        let holder = LockHolder::named("a@host");
        let token = FenceToken::new("a");
        store
            .try_acquire(&AcquireRequest {
                consultant_id: "C1",
                now,
                stale_before: now - Duration::minutes(5),
                holder: &holder,
                token: &token,
            })
            .unwrap();

        assert!(!store.release_if_token("C1", &FenceToken::new("b"), now).unwrap());
        assert!(store.release_if_token("C1", &token, now).unwrap());
        assert_eq!(
            store.get("C1").unwrap().unwrap().status,
            Some(LockStatus::Idle)
        );
    }

    #[test]
    fn clear_if_unchanged_compares_the_observed_row() {
        let store = MemoryLockStore::new();
        let now = Utc::now();
        store.provision("C1", now).unwrap();
        let observed = store.get("C1").unwrap().unwrap();

        let holder = LockHolder::named("a@host");
        let token = FenceToken::new("a");
        store
            .try_acquire(&AcquireRequest {
                consultant_id: "C1",
                now: now + Duration::seconds(1),
                stale_before: now - Duration::minutes(5),
                holder: &holder,
                token: &token,
            })
            .unwrap();

        assert!(!store.clear_if_unchanged(&observed, now).unwrap());
        assert!(store.get("C1").unwrap().unwrap().is_running());

        let current = store.get("C1").unwrap().unwrap();
        assert!(store.clear_if_unchanged(&current, now).unwrap());
        assert_eq!(
            store.get("C1").unwrap().unwrap().status,
            Some(LockStatus::Idle)
        );
    }

    #[test]
    fn events_filter_and_limit() {
        let store = MemoryLockStore::new();
        store.append_event(&Event::new(EventAction::Acquire, "C1")).unwrap();
        store.append_event(&Event::new(EventAction::Acquire, "C2")).unwrap();
        store.append_event(&Event::new(EventAction::Release, "C1")).unwrap();

        let c1 = store.list_events(Some("C1"), 10).unwrap();
        assert_eq!(c1.len(), 2);
        assert_eq!(c1[0].action, EventAction::Release);
        assert_eq!(store.list_events(None, 2).unwrap().len(), 2);
    }
}
