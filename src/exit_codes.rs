//! Exit code constants for the corral CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config, filesystem setup failure)
//! - 2: Task failure (a supervised command failed)
//! - 3: Timeout (a supervised command or lock wait ran out of time)
//! - 4: Lock acquisition failure (another instance is running)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or unusable lock directory.
pub const USER_ERROR: i32 = 1;

/// Task failure: a command run under a lock exited unsuccessfully or could not be polled.
pub const TASK_FAILURE: i32 = 2;

/// Timeout: the overall run deadline or a lock wait elapsed.
pub const TIMEOUT: i32 = 3;

/// Lock acquisition failure: the named lock is held by another live process.
pub const LOCK_FAILURE: i32 = 4;
