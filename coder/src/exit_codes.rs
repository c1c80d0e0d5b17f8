//! Stable exit codes for coder CLI commands.

/// Command succeeded or the cycle completed.
pub const OK: i32 = 0;
/// Invalid config, usage or any other error.
pub const INVALID: i32 = 1;
/// `coder run` stopped without completing the cycle.
pub const ABORTED: i32 = 2;
/// `coder set-focus` matched no project, or no project is focused.
pub const NOT_FOUND: i32 = 3;
