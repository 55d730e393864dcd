//! CLI argument parsing for schedlock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// schedlock: per-consultant scheduler lock for journey batches.
///
/// Every scheduler replica points at the same lock database. A consultant's
/// batch runs only on the replica that acquires that consultant's lock.
#[derive(Parser, Debug)]
#[command(name = "schedlock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ./schedlock.yaml when present).
    #[arg(long, global = true, env = "SCHEDLOCK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log lock decisions at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse arguments from the process command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands for schedlock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the lock database and a default config file.
    Init,

    /// Create the idle lock row for a consultant.
    Provision(ConsultantArgs),

    /// Acquire a consultant's lock and print its fence token.
    ///
    /// Retries with jittered exponential backoff. Exits with code 4 when
    /// another live instance holds the lock.
    Acquire(AcquireArgs),

    /// Release a consultant's lock.
    ///
    /// With --token, the lock is only released if it is still held with
    /// that token.
    Release(ReleaseArgs),

    /// Show lock state, holder, age, and staleness.
    Status(StatusArgs),

    /// Force a consultant's lock back to idle.
    ///
    /// Requires --force to prevent accidental clearing.
    Clear(ClearArgs),

    /// Print recent lock events as NDJSON, newest first.
    Events(EventsArgs),

    /// Run a command while holding a consultant's lock.
    ///
    /// The lock is released when the command exits, whether it succeeded
    /// or not. Exits with code 4 without running the command when the lock
    /// is held elsewhere.
    Run(RunArgs),
}

/// Arguments naming a single consultant.
#[derive(Parser, Debug)]
pub struct ConsultantArgs {
    /// Consultant whose lock to operate on.
    pub consultant_id: String,
}

/// Arguments for the `acquire` command.
#[derive(Parser, Debug)]
pub struct AcquireArgs {
    /// Consultant whose lock to acquire.
    pub consultant_id: String,

    /// Attempts before giving up (default: max_retries from config).
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Arguments for the `release` command.
#[derive(Parser, Debug)]
pub struct ReleaseArgs {
    /// Consultant whose lock to release.
    pub consultant_id: String,

    /// Fence token printed by `acquire`; enables the fenced release.
    #[arg(long)]
    pub token: Option<String>,
}

/// Arguments for the `status` command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Only show this consultant's lock.
    pub consultant_id: Option<String>,
}

/// Arguments for the `clear` command.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Consultant whose lock should be cleared.
    pub consultant_id: String,

    /// Force clearing the lock (required for safety).
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `events` command.
#[derive(Parser, Debug)]
pub struct EventsArgs {
    /// Only show events for this consultant.
    pub consultant_id: Option<String>,

    /// Maximum number of events to print.
    #[arg(short, long, default_value_t = 20)]
    pub limit: usize,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Consultant whose lock guards the command.
    pub consultant_id: String,

    /// Command to execute (shell-words parsed; no shell).
    #[arg(short, long)]
    pub command: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_global_flags() {
        let cli = Cli::try_parse_from([
            "schedlock",
            "run",
            "C1",
            "--command",
            "send-journeys --consultant C1",
            "--config",
            "/etc/schedlock.yaml",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/schedlock.yaml")));
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.consultant_id, "C1");
                assert_eq!(args.command, "send-journeys --consultant C1");
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn events_limit_defaults_to_twenty() {
        let cli = Cli::try_parse_from(["schedlock", "events"]).unwrap();
        match cli.command {
            Command::Events(args) => {
                assert_eq!(args.limit, 20);
                assert!(args.consultant_id.is_none());
            }
            other => panic!("expected events, got {:?}", other),
        }
    }

    #[test]
    fn acquire_requires_consultant() {
        assert!(Cli::try_parse_from(["schedlock", "acquire"]).is_err());
    }
}
