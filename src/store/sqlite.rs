//! SQLite-backed lock store shared by every process that opens the same file.

use super::{AcquireOutcome, AcquireRequest, LockStore};
use crate::error::{Result, SchedlockError};
use crate::events::{Event, EventAction};
use crate::locks::{FenceToken, LockHolder, LockRecord, LockStatus};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORD_COLUMNS: &str =
    "consultant_id, scheduler_status, updated_at, holder, holder_pid, fence_token";

/// SQLite-backed lock store.
///
/// Each process opens its own connection; SQLite serialises writers, and the
/// busy timeout makes a contended writer wait instead of failing.
pub struct SqliteLockStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLockStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteLockStore {
    /// Open or create the lock database with the default busy timeout.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open or create the lock database.
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            SchedlockError::StorageError(format!(
                "failed to open lock database '{}': {}",
                path.display(),
                e
            ))
        })?;
        conn.busy_timeout(busy_timeout)
            .map_err(storage_error("set busy timeout"))?;

        let store = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            -- One advisory lock row per consultant
            CREATE TABLE IF NOT EXISTS scheduler_locks (
                consultant_id TEXT PRIMARY KEY,
                scheduler_status TEXT DEFAULT 'idle'
                    CHECK (scheduler_status IS NULL OR scheduler_status IN ('idle', 'running')),
                updated_at INTEGER NOT NULL,     -- unix millis, UTC
                holder TEXT,
                holder_pid INTEGER,
                fence_token TEXT
            );

            -- Append-only audit log of lock transitions
            CREATE TABLE IF NOT EXISTS scheduler_lock_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                action TEXT NOT NULL,
                consultant_id TEXT NOT NULL,
                actor TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_scheduler_lock_events_consultant
                ON scheduler_lock_events (consultant_id, id);
         ",
            )
            .map_err(storage_error("migrate lock database"))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            SchedlockError::StorageError("lock database connection mutex poisoned".to_string())
        })
    }
}

impl LockStore for SqliteLockStore {
    fn provision(&self, consultant_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "INSERT OR IGNORE INTO scheduler_locks (consultant_id, scheduler_status, updated_at)
                 VALUES (?1, 'idle', ?2)",
                params![consultant_id, now.timestamp_millis()],
            )
            .map_err(storage_error("provision lock row"))?;
        Ok(changed > 0)
    }

    fn try_acquire(&self, request: &AcquireRequest<'_>) -> Result<AcquireOutcome> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front, so the row read for logging
        // is the row the guarded UPDATE below is evaluated against.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_error("begin acquire"))?;

        let Some(previous) = select_record(&tx, request.consultant_id)? else {
            return Ok(AcquireOutcome::Missing);
        };

        let changed = tx
            .execute(
                "UPDATE scheduler_locks
                 SET scheduler_status = 'running',
                     updated_at = ?2,
                     holder = ?3,
                     holder_pid = ?4,
                     fence_token = ?5
                 WHERE consultant_id = ?1
                   AND (scheduler_status IS NULL
                        OR scheduler_status = 'idle'
                        OR (scheduler_status = 'running' AND updated_at < ?6))",
                params![
                    request.consultant_id,
                    request.now.timestamp_millis(),
                    request.holder.owner,
                    request.holder.pid,
                    request.token.as_str(),
                    request.stale_before.timestamp_millis(),
                ],
            )
            .map_err(storage_error("acquire lock row"))?;

        tx.commit().map_err(storage_error("commit acquire"))?;

        Ok(if changed == 0 {
            AcquireOutcome::Busy { current: previous }
        } else if previous.is_running() {
            AcquireOutcome::TakenOver { previous }
        } else {
            AcquireOutcome::Acquired
        })
    }

    fn release(&self, consultant_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE scheduler_locks
                 SET scheduler_status = 'idle', updated_at = ?2,
                     holder = NULL, holder_pid = NULL, fence_token = NULL
                 WHERE consultant_id = ?1",
                params![consultant_id, now.timestamp_millis()],
            )
            .map_err(storage_error("release lock row"))?;
        Ok(changed > 0)
    }

    fn release_if_token(
        &self,
        consultant_id: &str,
        token: &FenceToken,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE scheduler_locks
                 SET scheduler_status = 'idle', updated_at = ?3,
                     holder = NULL, holder_pid = NULL, fence_token = NULL
                 WHERE consultant_id = ?1
                   AND scheduler_status = 'running'
                   AND fence_token = ?2",
                params![consultant_id, token.as_str(), now.timestamp_millis()],
            )
            .map_err(storage_error("release fenced lock row"))?;
        Ok(changed > 0)
    }

    fn clear_if_unchanged(
        &self,
        observed: &LockRecord,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE scheduler_locks
                 SET scheduler_status = 'idle', updated_at = ?4,
                     holder = NULL, holder_pid = NULL, fence_token = NULL
                 WHERE consultant_id = ?1
                   AND scheduler_status IS ?2
                   AND updated_at = ?3
                   AND fence_token IS ?5",
                params![
                    observed.consultant_id,
                    observed.status.map(|s| s.as_str()),
                    observed.updated_at.timestamp_millis(),
                    now.timestamp_millis(),
                    observed.fence_token.as_ref().map(|t| t.as_str()),
                ],
            )
            .map_err(storage_error("clear lock row"))?;
        Ok(changed > 0)
    }

    fn get(&self, consultant_id: &str) -> Result<Option<LockRecord>> {
        let conn = self.conn()?;
        select_record(&conn, consultant_id)
    }

    fn list(&self) -> Result<Vec<LockRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM scheduler_locks ORDER BY consultant_id"
            ))
            .map_err(storage_error("list lock rows"))?;

        let rows = stmt
            .query_map([], record_from_row)
            .map_err(storage_error("list lock rows"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error("read lock row"))
    }

    fn append_event(&self, event: &Event) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO scheduler_lock_events (ts, action, consultant_id, actor, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.ts.to_rfc3339(),
                    event.action.as_str(),
                    event.consultant_id,
                    event.actor,
                    event.details.to_string(),
                ],
            )
            .map_err(storage_error("append lock event"))?;
        Ok(())
    }

    fn list_events(&self, consultant_id: Option<&str>, limit: usize) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn
            .prepare(
                "SELECT ts, action, consultant_id, actor, details
                 FROM scheduler_lock_events
                 WHERE ?1 IS NULL OR consultant_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )
            .map_err(storage_error("list lock events"))?;

        let rows = stmt
            .query_map(params![consultant_id, limit], event_from_row)
            .map_err(storage_error("list lock events"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage_error("read lock event"))
    }
}

fn storage_error(context: &'static str) -> impl Fn(rusqlite::Error) -> SchedlockError {
    move |e| SchedlockError::StorageError(format!("{}: {}", context, e))
}

fn select_record(conn: &Connection, consultant_id: &str) -> Result<Option<LockRecord>> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM scheduler_locks WHERE consultant_id = ?1"),
        params![consultant_id],
        record_from_row,
    )
    .optional()
    .map_err(storage_error("read lock row"))
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<LockRecord> {
    let consultant_id: String = row.get(0)?;
    let status_str: Option<String> = row.get(1)?;
    let updated_at_ms: i64 = row.get(2)?;
    let holder: Option<String> = row.get(3)?;
    let holder_pid: Option<u32> = row.get(4)?;
    let fence_token: Option<String> = row.get(5)?;

    let status = match status_str {
        None => None,
        Some(s) => Some(LockStatus::parse(&s).ok_or_else(|| {
            conversion_error(1, format!("unknown scheduler_status '{}'", s))
        })?),
    };
    let updated_at = DateTime::from_timestamp_millis(updated_at_ms).ok_or_else(|| {
        conversion_error(2, format!("updated_at out of range: {}", updated_at_ms))
    })?;

    Ok(LockRecord {
        consultant_id,
        status,
        updated_at,
        holder: holder.map(|owner| LockHolder {
            owner,
            pid: holder_pid,
        }),
        fence_token: fence_token.map(FenceToken::new),
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let ts_str: String = row.get(0)?;
    let action_str: String = row.get(1)?;
    let consultant_id: String = row.get(2)?;
    let actor: String = row.get(3)?;
    let details_str: String = row.get(4)?;

    let ts = DateTime::parse_from_rfc3339(&ts_str)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(0, format!("bad event timestamp '{}': {}", ts_str, e)))?;
    let action = EventAction::parse(&action_str)
        .ok_or_else(|| conversion_error(1, format!("unknown event action '{}'", action_str)))?;
    let details = serde_json::from_str(&details_str)
        .map_err(|e| conversion_error(4, format!("bad event details '{}': {}", details_str, e)))?;

    Ok(Event {
        ts,
        action,
        consultant_id,
        actor,
        details,
    })
}
