//! Implementation of the `schedlock run` command.
//!
//! Acquires a consultant's lock, runs a command while holding it, and always
//! releases the lock afterwards, whether the command succeeded or not. Each
//! run ends with a `run_finished` event carrying the exit status and duration.

use super::{CommandContext, busy_error};
use crate::cli::RunArgs;
use crate::error::{Result, SchedlockError};
use crate::events::{Event, EventAction};
use serde_json::json;
use std::process::Command;
use std::time::Instant;
use tracing::{info, warn};

/// Environment variable carrying the consultant ID into the guarded command.
pub const CONSULTANT_ID_ENV: &str = "SCHEDLOCK_CONSULTANT_ID";

/// Environment variable carrying the fence token into the guarded command.
pub const FENCE_TOKEN_ENV: &str = "SCHEDLOCK_FENCE_TOKEN";

/// Execute the `schedlock run` command.
pub fn cmd_run(ctx: &CommandContext, args: RunArgs) -> Result<()> {
    let argv = parse_command(&args.command)?;
    let lock = ctx.open_lock()?;

    let Some(guard) = lock.lock(&args.consultant_id)? else {
        return Err(busy_error(
            &args.consultant_id,
            lock.retry_policy().max_retries,
        ));
    };

    info!(
        consultant_id = %args.consultant_id,
        command = %args.command,
        "running guarded command"
    );

    let started = Instant::now();
    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .current_dir(&ctx.cwd)
        .env(CONSULTANT_ID_ENV, &args.consultant_id)
        .env(FENCE_TOKEN_ENV, guard.token().as_str())
        .status();
    let elapsed = started.elapsed();

    // Release before looking at the command's result.
    let released = match guard.release() {
        Ok(true) => true,
        Ok(false) => {
            warn!(
                consultant_id = %args.consultant_id,
                "lock was taken over while the command ran; it ran longer than the staleness threshold"
            );
            false
        }
        Err(e) => {
            warn!(
                consultant_id = %args.consultant_id,
                error = %e,
                "failed to release scheduler lock after command"
            );
            false
        }
    };

    lock.record_event(
        Event::new(EventAction::RunFinished, &args.consultant_id).with_details(json!({
            "command": args.command,
            "success": status.as_ref().is_ok_and(|s| s.success()),
            "exit_code": status.as_ref().ok().and_then(|s| s.code()),
            "error": status.as_ref().err().map(|e| e.to_string()),
            "duration_ms": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "lock_released": released,
        })),
    );

    let status = status.map_err(|e| {
        SchedlockError::CommandError(format!(
            "failed to execute '{}': {}\nFix: ensure the command is installed and in PATH.",
            args.command, e
        ))
    })?;

    if !status.success() {
        return Err(SchedlockError::CommandError(format!(
            "'{}' exited with {}",
            args.command,
            status
                .code()
                .map(|c| format!("status {}", c))
                .unwrap_or_else(|| "a signal".to_string())
        )));
    }

    Ok(())
}

fn parse_command(command: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(command).map_err(|e| {
        SchedlockError::UserError(format!(
            "failed to parse command '{}': {}\n\
             Fix: check for unmatched quotes or invalid escape sequences.",
            command, e
        ))
    })?;

    if argv.is_empty() {
        return Err(SchedlockError::UserError(format!(
            "command is empty after parsing: '{}'",
            command
        )));
    }

    Ok(argv)
}
