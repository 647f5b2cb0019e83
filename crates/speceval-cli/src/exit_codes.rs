//! Process exit codes. Part of the public contract for CI scripts.

/// Every selected case completed.
pub const SUCCESS: i32 = 0;
/// At least one case ended timed-out or failed.
pub const CASES_INCOMPLETE: i32 = 1;
/// Bad test file, bad target, unmatched `--test-id`, or the result log failed.
pub const CONFIG_ERROR: i32 = 2;
/// Interrupted by the operator (128 + SIGINT).
pub const INTERRUPTED: i32 = 130;
