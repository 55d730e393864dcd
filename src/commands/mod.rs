//! Command implementations for schedlock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every handler takes a [`CommandContext`] so it can be
//! exercised against a temporary database in tests.

mod init;
mod run;
mod status;

#[cfg(test)]
mod tests;

use crate::cli::{
    AcquireArgs, ClearArgs, Cli, Command, ConsultantArgs, EventsArgs, ReleaseArgs,
};
use crate::config::Config;
use crate::error::{Result, SchedlockError};
use crate::locks::{FenceToken, SchedulerLock};
use crate::store::SqliteLockStore;
use std::path::PathBuf;
use std::time::Duration;

pub use init::cmd_init;
pub use run::cmd_run;
pub use status::cmd_status;

/// Resolved configuration and working directory for one invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Effective configuration.
    pub config: Config,

    /// Directory relative paths are resolved against.
    pub cwd: PathBuf,

    /// Whether the config came from an explicit `--config`.
    pub explicit_config: bool,
}

impl CommandContext {
    /// Absolute path of the lock database.
    pub fn database_path(&self) -> PathBuf {
        self.config.database_path_in(&self.cwd)
    }

    /// Open the lock database and build a lock handle from the config.
    ///
    /// Fails with a user error when the database has not been initialised,
    /// so a typo in `database_path` does not silently create an empty store.
    pub fn open_lock(&self) -> Result<SchedulerLock<SqliteLockStore>> {
        let path = self.database_path();
        if !path.is_file() {
            return Err(SchedlockError::UserError(format!(
                "lock database not found at '{}'.\n\n\
                 Fix: run `schedlock init` or point database_path at an existing database.",
                path.display()
            )));
        }

        let store = SqliteLockStore::open_with_timeout(
            &path,
            Duration::from_millis(self.config.busy_timeout_ms),
        )?;
        Ok(SchedulerLock::from_config(store, &self.config))
    }
}

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. Config is resolved
/// once here and shared by every handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().map_err(|e| {
        SchedlockError::UserError(format!("failed to get current working directory: {}", e))
    })?;
    let config = Config::resolve(cli.config.as_deref(), &cwd)?;
    let ctx = CommandContext {
        config,
        cwd,
        explicit_config: cli.config.is_some(),
    };

    match cli.command {
        Command::Init => cmd_init(&ctx),
        Command::Provision(args) => cmd_provision(&ctx, args),
        Command::Acquire(args) => cmd_acquire(&ctx, args),
        Command::Release(args) => cmd_release(&ctx, args),
        Command::Status(args) => cmd_status(&ctx, args),
        Command::Clear(args) => cmd_clear(&ctx, args),
        Command::Events(args) => cmd_events(&ctx, args),
        Command::Run(args) => cmd_run(&ctx, args),
    }
}

fn cmd_provision(ctx: &CommandContext, args: ConsultantArgs) -> Result<()> {
    let lock = ctx.open_lock()?;

    if lock.provision(&args.consultant_id)? {
        println!("Provisioned lock for consultant {}", args.consultant_id);
    } else {
        println!("Lock for consultant {} already exists", args.consultant_id);
    }
    Ok(())
}

fn cmd_acquire(ctx: &CommandContext, args: AcquireArgs) -> Result<()> {
    let mut policy = ctx.config.retry_policy();
    if let Some(max_retries) = args.max_retries {
        policy.max_retries = max_retries;
    }
    let max_retries = policy.max_retries;
    let lock = ctx.open_lock()?.with_retry_policy(policy);

    match lock.acquire_fenced(&args.consultant_id)? {
        Some(token) => {
            // Token on stdout alone so scripts can capture it.
            println!("{}", token);
            Ok(())
        }
        None => Err(busy_error(&args.consultant_id, max_retries)),
    }
}

fn cmd_release(ctx: &CommandContext, args: ReleaseArgs) -> Result<()> {
    let lock = ctx.open_lock()?;

    match args.token {
        Some(token) => {
            if lock.release_fenced(&args.consultant_id, &FenceToken::new(token))? {
                println!("Released lock for consultant {}", args.consultant_id);
                Ok(())
            } else {
                Err(SchedlockError::LockError(format!(
                    "lock for consultant '{}' is no longer held with that token \
                     (taken over or already released); nothing was changed",
                    args.consultant_id
                )))
            }
        }
        None => {
            lock.release(&args.consultant_id)?;
            println!("Released lock for consultant {}", args.consultant_id);
            Ok(())
        }
    }
}

fn cmd_clear(ctx: &CommandContext, args: ClearArgs) -> Result<()> {
    // Require --force flag
    if !args.force {
        return Err(SchedlockError::UserError(format!(
            "refusing to clear lock without --force flag.\n\n\
             Clearing a lock lets another instance start the same batch while the \
             current holder may still be sending.\n\
             Only clear locks if you are certain the lock holder has crashed.\n\n\
             To clear the lock, run:\n  schedlock clear {} --force",
            args.consultant_id
        )));
    }

    let lock = ctx.open_lock()?;
    let cleared = lock.clear(&args.consultant_id)?;

    println!("Cleared lock: {}", args.consultant_id);
    println!();
    println!("Lock details:");
    println!("  Status:     {}", cleared.status());
    if let Some(holder) = &cleared.record.holder {
        println!("  Holder:     {}", holder);
    }
    println!(
        "  Updated:    {}",
        cleared.record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Age:        {}", cleared.age_string());
    if cleared.is_stale {
        println!("  Note:       was STALE");
    }

    Ok(())
}

fn cmd_events(ctx: &CommandContext, args: EventsArgs) -> Result<()> {
    let lock = ctx.open_lock()?;

    for event in lock.events(args.consultant_id.as_deref(), args.limit)? {
        println!("{}", event.to_json_line()?);
    }
    Ok(())
}

fn busy_error(consultant_id: &str, attempts: u32) -> SchedlockError {
    SchedlockError::LockError(format!(
        "consultant '{}' is being processed by another instance (gave up after {} attempt(s))",
        consultant_id, attempts
    ))
}
