use crate::config::Config;
use crate::locks::{FenceToken, LockHolder, RetryPolicy};
use crate::store::{AcquireRequest, LockStore, SqliteLockStore};
use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;
use tempfile::TempDir;

/// A SQLite store in a fresh temp directory, at `<dir>/locks.db`.
pub(crate) fn temp_sqlite_store() -> (TempDir, SqliteLockStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = SqliteLockStore::open(&temp_dir.path().join("locks.db")).unwrap();
    (temp_dir, store)
}

/// Retry policy with millisecond waits so contention tests stay fast.
pub(crate) fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: StdDuration::from_millis(5),
        max_jitter: StdDuration::from_millis(2),
    }
}

/// Config pointing at `<dir>/locks.db` with fast retries.
pub(crate) fn test_config(dir: &TempDir) -> Config {
    Config {
        database_path: dir.path().join("locks.db").to_string_lossy().to_string(),
        max_retries: 2,
        retry_base_delay_ms: 5,
        retry_max_jitter_ms: 2,
        ..Config::default()
    }
}

/// Put `consultant_id` into `running` as if `owner` had acquired it `age` ago.
///
/// The row must be acquirable at that point in the past.
pub(crate) fn stamp_running<S: LockStore>(
    store: &S,
    consultant_id: &str,
    owner: &str,
    age: Duration,
) -> FenceToken {
    let then = Utc::now() - age;
    let holder = LockHolder::named(owner);
    let token = FenceToken::generate();
    store.provision(consultant_id, then).unwrap();
    let outcome = store
        .try_acquire(&AcquireRequest {
            consultant_id,
            now: then,
            stale_before: then - Duration::minutes(5),
            holder: &holder,
            token: &token,
        })
        .unwrap();
    assert!(outcome.is_acquired(), "could not stamp {}: {:?}", consultant_id, outcome);
    token
}
