//! Stable exit codes for pilot CLI commands.

/// Command succeeded; for `run`, every task was processed.
pub const OK: i32 = 0;
/// Invalid input, layout or config, or any other error.
pub const INVALID: i32 = 1;
/// `pilot exec` ran a command that failed.
pub const COMMAND_FAILED: i32 = 2;
/// `pilot run` ended without finishing (stopped or text generation failed).
pub const RUN_UNSUCCESSFUL: i32 = 3;
