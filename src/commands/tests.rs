//! Tests for the command handlers.

use super::*;
use crate::cli::{RunArgs, StatusArgs};
use crate::events::{Event, EventAction};
use crate::exit_codes;
use crate::locks::{LockHolder, LockStatus};
use crate::test_support::test_config;
use tempfile::TempDir;

fn context(dir: &TempDir) -> CommandContext {
    CommandContext {
        config: test_config(dir),
        cwd: dir.path().to_path_buf(),
        explicit_config: false,
    }
}

fn initialized(dir: &TempDir) -> CommandContext {
    let ctx = context(dir);
    cmd_init(&ctx).unwrap();
    cmd_provision(
        &ctx,
        ConsultantArgs {
            consultant_id: "C1".to_string(),
        },
    )
    .unwrap();
    ctx
}

/// A second replica pointed at the same database.
fn other_replica(ctx: &CommandContext) -> SchedulerLock<SqliteLockStore> {
    ctx.open_lock()
        .unwrap()
        .with_holder(LockHolder::named("other@replica-2"))
}

fn status_of(ctx: &CommandContext, consultant_id: &str) -> LockStatus {
    ctx.open_lock()
        .unwrap()
        .inspect(consultant_id)
        .unwrap()
        .unwrap()
        .status()
}

fn last_event(ctx: &CommandContext, consultant_id: &str) -> Event {
    ctx.open_lock()
        .unwrap()
        .events(Some(consultant_id), 1)
        .unwrap()
        .remove(0)
}

#[test]
fn test_open_lock_requires_init() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir);

    let err = ctx.open_lock().unwrap_err();
    assert!(matches!(err, SchedlockError::UserError(_)));
    assert!(err.to_string().contains("schedlock init"));
}

#[test]
fn test_init_creates_database_and_default_config() {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(&dir);
    ctx.config.database_path = "state/locks.db".to_string();

    cmd_init(&ctx).unwrap();

    assert!(dir.path().join("state/locks.db").is_file());
    let written = Config::load(Config::default_path(dir.path())).unwrap();
    assert_eq!(written.database_path, "state/locks.db");

    // Second run is a no-op.
    cmd_init(&ctx).unwrap();
}

#[test]
fn test_init_with_explicit_config_writes_no_config_file() {
    let dir = TempDir::new().unwrap();
    let mut ctx = context(&dir);
    ctx.explicit_config = true;

    cmd_init(&ctx).unwrap();

    assert!(ctx.database_path().is_file());
    assert!(!Config::default_path(dir.path()).exists());
}

#[test]
fn test_acquire_then_fenced_release() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);

    cmd_acquire(
        &ctx,
        AcquireArgs {
            consultant_id: "C1".to_string(),
            max_retries: None,
        },
    )
    .unwrap();
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Running);

    let token = ctx
        .open_lock()
        .unwrap()
        .inspect("C1")
        .unwrap()
        .unwrap()
        .record
        .fence_token
        .unwrap();

    cmd_release(
        &ctx,
        ReleaseArgs {
            consultant_id: "C1".to_string(),
            token: Some(token.as_str().to_string()),
        },
    )
    .unwrap();
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Idle);
}

#[test]
fn test_acquire_reports_contention_as_lock_failure() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);
    assert!(other_replica(&ctx).acquire("C1").unwrap());

    let err = cmd_acquire(
        &ctx,
        AcquireArgs {
            consultant_id: "C1".to_string(),
            max_retries: Some(1),
        },
    )
    .unwrap_err();

    assert!(matches!(err, SchedlockError::LockError(_)));
    assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);
    assert!(err.to_string().contains("1 attempt(s)"));
}

#[test]
fn test_release_with_stale_token_is_refused() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);
    assert!(other_replica(&ctx).acquire("C1").unwrap());

    let err = cmd_release(
        &ctx,
        ReleaseArgs {
            consultant_id: "C1".to_string(),
            token: Some("not-the-token".to_string()),
        },
    )
    .unwrap_err();

    assert!(matches!(err, SchedlockError::LockError(_)));
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Running);
}

#[test]
fn test_plain_release_is_unconditional() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);
    assert!(other_replica(&ctx).acquire("C1").unwrap());

    cmd_release(
        &ctx,
        ReleaseArgs {
            consultant_id: "C1".to_string(),
            token: None,
        },
    )
    .unwrap();
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Idle);
}

#[test]
fn test_clear_requires_force() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);
    assert!(other_replica(&ctx).acquire("C1").unwrap());

    let err = cmd_clear(
        &ctx,
        ClearArgs {
            consultant_id: "C1".to_string(),
            force: false,
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("--force"));
    assert!(err.to_string().contains("schedlock clear C1 --force"));
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Running);

    cmd_clear(
        &ctx,
        ClearArgs {
            consultant_id: "C1".to_string(),
            force: true,
        },
    )
    .unwrap();
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Idle);
}

#[test]
fn test_status_of_unknown_consultant_fails() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);

    cmd_status(&ctx, StatusArgs { consultant_id: None }).unwrap();
    cmd_status(
        &ctx,
        StatusArgs {
            consultant_id: Some("C1".to_string()),
        },
    )
    .unwrap();

    let err = cmd_status(
        &ctx,
        StatusArgs {
            consultant_id: Some("nobody".to_string()),
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("schedlock provision nobody"));
}

#[test]
fn test_events_lists_recorded_actions() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);

    cmd_events(
        &ctx,
        EventsArgs {
            consultant_id: Some("C1".to_string()),
            limit: 5,
        },
    )
    .unwrap();

    let events = ctx.open_lock().unwrap().events(Some("C1"), 5).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, EventAction::Provision);
}

#[cfg(unix)]
#[test]
fn test_run_releases_lock_after_success() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);

    cmd_run(
        &ctx,
        RunArgs {
            consultant_id: "C1".to_string(),
            command: "touch ran.marker".to_string(),
        },
    )
    .unwrap();

    assert!(dir.path().join("ran.marker").exists());
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Idle);

    let finished = last_event(&ctx, "C1");
    assert_eq!(finished.action, EventAction::RunFinished);
    assert_eq!(finished.details["success"], true);
    assert_eq!(finished.details["exit_code"], 0);
    assert_eq!(finished.details["command"], "touch ran.marker");
    assert!(finished.details["duration_ms"].is_u64());
}

#[cfg(unix)]
#[test]
fn test_run_releases_lock_after_failure() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);

    let err = cmd_run(
        &ctx,
        RunArgs {
            consultant_id: "C1".to_string(),
            command: "false".to_string(),
        },
    )
    .unwrap_err();

    assert!(matches!(err, SchedlockError::CommandError(_)));
    assert_eq!(err.exit_code(), exit_codes::COMMAND_FAILURE);
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Idle);

    let finished = last_event(&ctx, "C1");
    assert_eq!(finished.action, EventAction::RunFinished);
    assert_eq!(finished.details["success"], false);
    assert_eq!(finished.details["exit_code"], 1);
    assert_eq!(finished.details["lock_released"], true);
}

#[test]
fn test_run_releases_lock_when_command_is_missing() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);

    let err = cmd_run(
        &ctx,
        RunArgs {
            consultant_id: "C1".to_string(),
            command: "schedlock-test-no-such-binary".to_string(),
        },
    )
    .unwrap_err();

    assert!(matches!(err, SchedlockError::CommandError(_)));
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Idle);

    let finished = last_event(&ctx, "C1");
    assert_eq!(finished.action, EventAction::RunFinished);
    assert_eq!(finished.details["success"], false);
    assert!(finished.details["exit_code"].is_null());
    assert!(finished.details["error"].is_string());
}

#[cfg(unix)]
#[test]
fn test_run_skips_command_when_lock_is_held() {
    let dir = TempDir::new().unwrap();
    let ctx = initialized(&dir);
    assert!(other_replica(&ctx).acquire("C1").unwrap());

    let err = cmd_run(
        &ctx,
        RunArgs {
            consultant_id: "C1".to_string(),
            command: "touch ran.marker".to_string(),
        },
    )
    .unwrap_err();

    assert!(matches!(err, SchedlockError::LockError(_)));
    assert!(!dir.path().join("ran.marker").exists());
    assert_eq!(status_of(&ctx, "C1"), LockStatus::Running);
}
