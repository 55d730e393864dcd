//! Error types for schedlock.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Lock contention is not an error inside the library: `acquire` returns `false`.
//! The CLI turns contention into [`SchedlockError::LockError`] so scripts can
//! branch on the exit code.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for schedlock operations.
#[derive(Error, Debug)]
pub enum SchedlockError {
    /// Invalid arguments, invalid configuration, or an unknown lock.
    #[error("{0}")]
    UserError(String),

    /// The command executed under the lock failed.
    #[error("Guarded command failed: {0}")]
    CommandError(String),

    /// The lock store failed. Callers must treat the lock as not acquired.
    #[error("Storage operation failed: {0}")]
    StorageError(String),

    /// Lock is held by another live owner.
    #[error("Lock acquisition failed: {0}")]
    LockError(String),
}

impl SchedlockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SchedlockError::UserError(_) => exit_codes::USER_ERROR,
            SchedlockError::CommandError(_) => exit_codes::COMMAND_FAILURE,
            SchedlockError::StorageError(_) => exit_codes::STORAGE_FAILURE,
            SchedlockError::LockError(_) => exit_codes::LOCK_FAILURE,
        }
    }
}

/// Result type alias for schedlock operations.
pub type Result<T> = std::result::Result<T, SchedlockError>;
