//! Exit code constants for the schedlock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, bad config, unknown lock)
//! - 2: Guarded command failed
//! - 3: Storage failure
//! - 4: Lock held by another live owner

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid config, or an unknown lock.
pub const USER_ERROR: i32 = 1;

/// The command run under the lock could not start or exited non-zero.
pub const COMMAND_FAILURE: i32 = 2;

/// The lock store could not be opened, read, or written.
pub const STORAGE_FAILURE: i32 = 3;

/// Lock acquisition failed: another instance holds a fresh lock.
pub const LOCK_FAILURE: i32 = 4;
