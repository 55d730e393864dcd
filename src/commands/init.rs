//! Implementation of the `schedlock init` command.
//!
//! Creates the lock database (and its parent directory) and writes a default
//! `schedlock.yaml` when no config file exists yet. Idempotent.

use super::CommandContext;
use crate::config::Config;
use crate::error::{Result, SchedlockError};
use crate::store::SqliteLockStore;
use std::fs;
use std::time::Duration;

/// Execute the `schedlock init` command.
pub fn cmd_init(ctx: &CommandContext) -> Result<()> {
    let db_path = ctx.database_path();

    if let Some(parent) = db_path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            SchedlockError::UserError(format!(
                "failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Opening runs the migrations.
    SqliteLockStore::open_with_timeout(&db_path, Duration::from_millis(ctx.config.busy_timeout_ms))?;
    println!("Lock database ready: {}", db_path.display());

    if !ctx.explicit_config {
        let config_path = Config::default_path(&ctx.cwd);
        if !config_path.exists() {
            fs::write(&config_path, ctx.config.to_yaml()?).map_err(|e| {
                SchedlockError::UserError(format!(
                    "failed to write config file '{}': {}",
                    config_path.display(),
                    e
                ))
            })?;
            println!("Wrote default config: {}", config_path.display());
        }
    }

    Ok(())
}
