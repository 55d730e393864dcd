//! Implementation of the `schedlock status` command.

use super::CommandContext;
use crate::cli::StatusArgs;
use crate::error::{Result, SchedlockError};
use crate::locks::LockInfo;

/// Execute the `schedlock status` command.
///
/// Without a consultant ID every provisioned lock is listed.
pub fn cmd_status(ctx: &CommandContext, args: StatusArgs) -> Result<()> {
    let lock = ctx.open_lock()?;

    let locks = match args.consultant_id {
        Some(id) => {
            let info = lock.inspect(&id)?.ok_or_else(|| {
                SchedlockError::UserError(format!(
                    "no scheduler lock exists for consultant '{}'.\n\n\
                     Fix: run `schedlock provision {}` first.",
                    id, id
                ))
            })?;
            vec![info]
        }
        None => lock.list()?,
    };

    if locks.is_empty() {
        println!("No scheduler locks provisioned.");
        return Ok(());
    }

    println!("Scheduler locks ({}):", locks.len());
    println!();

    for info in &locks {
        print_lock(info, ctx.config.lock_stale_minutes);
    }

    let stale_count = locks.iter().filter(|l| l.is_stale).count();
    if stale_count > 0 {
        println!(
            "Note: {} lock(s) are stale and will be taken over on the next acquire. \
             Use `schedlock clear <consultant-id> --force` to reset one now.",
            stale_count
        );
    }

    Ok(())
}

fn print_lock(info: &LockInfo, stale_minutes: u32) {
    println!("  {}:", info.record.consultant_id);
    println!("    Status:     {}", info.status());
    if let Some(holder) = &info.record.holder {
        println!("    Holder:     {}", holder.owner);
        if let Some(pid) = holder.pid {
            println!("    PID:        {}", pid);
        }
    }
    println!(
        "    Updated:    {}",
        info.record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("    Age:        {}", info.age_string());
    if info.is_stale {
        println!("    Note:       STALE (exceeds {} min threshold)", stale_minutes);
    }
    println!();
}
