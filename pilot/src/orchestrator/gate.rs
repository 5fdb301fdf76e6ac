//! Approval-gate helpers shared by callers of the orchestrator.

use crate::core::types::{CommandExecutionResult, FailureKind};

pub const DENIAL_PREFIX: &str = "Command denied by operator:";

/// Result reported when the operator refuses to run `command_line`.
pub fn denied(command_line: &str) -> CommandExecutionResult {
    CommandExecutionResult::failure(
        FailureKind::Denied,
        "",
        format!("{DENIAL_PREFIX} {}", command_line.trim()),
    )
}

pub fn is_denial(error: &str) -> bool {
    error.trim_start().starts_with(DENIAL_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_carries_marker_and_line() {
        let result = denied(" rm -rf build ");
        assert_eq!(result.failure, Some(FailureKind::Denied));
        assert_eq!(result.error, "Command denied by operator: rm -rf build");
        assert!(result.output.is_empty());
        assert!(is_denial(&result.error));
        assert!(!is_denial("Command failed (exit code 1)"));
    }
}
