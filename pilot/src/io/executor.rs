//! Resolve, substitute and run a raw command line.
//!
//! [`CommandExecutor`] never returns `Err`: every failure, from an unknown
//! name to a process that could not be spawned, is reported inside the
//! [`CommandExecutionResult`] so callers can feed it back uniformly.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::core::command_line::parse_command_line;
use crate::core::registry::{self, Implementation, RegistryHandle};
use crate::core::template::substitute;
use crate::core::types::{CommandExecutionResult, FailureKind};
use crate::io::process::ProcessRunner;

/// Output reported for a successful command that printed nothing.
pub const NO_OUTPUT_NOTICE: &str = "Command executed successfully (exit code 0). No output.";

#[derive(Clone)]
pub struct CommandExecutor {
    registry: RegistryHandle,
    runner: Arc<dyn ProcessRunner>,
}

impl CommandExecutor {
    pub fn new(registry: RegistryHandle, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { registry, runner }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Run one raw command line. Blocks until the command finishes.
    #[instrument(skip_all, fields(command_line = %raw_line))]
    pub fn execute(&self, raw_line: &str) -> CommandExecutionResult {
        let Some(parsed) = parse_command_line(raw_line) else {
            return CommandExecutionResult::failure(
                FailureKind::CommandNotFound,
                "",
                "Empty command line.",
            );
        };

        // Copy out what we need so the registry lock is not held while running.
        let descriptor = registry::read(&self.registry).get(&parsed.name).cloned();
        let Some(descriptor) = descriptor else {
            warn!(name = %parsed.name, "command not found");
            return CommandExecutionResult::failure(
                FailureKind::CommandNotFound,
                "",
                format!("Command not found: {}", parsed.name),
            );
        };
        if !descriptor.flags.enabled {
            warn!(name = %parsed.name, "command disabled");
            return CommandExecutionResult::failure(
                FailureKind::CommandDisabled,
                "",
                format!("Command '{}' is disabled.", parsed.name),
            );
        }
        if descriptor.is_help_request(&parsed.args) {
            debug!(name = %parsed.name, "help requested");
            return CommandExecutionResult::success(descriptor.help());
        }

        match &descriptor.implementation {
            Implementation::Native(Some(handler)) => {
                match catch_unwind(AssertUnwindSafe(|| handler(&parsed.args))) {
                    Ok(Ok(output)) => {
                        info!(name = %parsed.name, "native command succeeded");
                        CommandExecutionResult::success(non_empty_output(output))
                    }
                    Ok(Err(err)) => {
                        warn!(name = %parsed.name, err = %err, "native command failed");
                        CommandExecutionResult::failure(
                            FailureKind::HandlerFailed,
                            "",
                            format!("Command '{}' failed: {err:#}", parsed.name),
                        )
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        warn!(name = %parsed.name, panic = %message, "native command panicked");
                        CommandExecutionResult::failure(
                            FailureKind::HandlerFailed,
                            "",
                            format!("Command '{}' panicked: {message}", parsed.name),
                        )
                    }
                }
            }
            Implementation::Native(None) => CommandExecutionResult::failure(
                FailureKind::NotExecutable,
                "",
                format!(
                    "Command '{}' is native but has no handler in this process.",
                    parsed.name
                ),
            ),
            Implementation::OsTemplate(template) if template.trim().is_empty() => {
                warn!(name = %parsed.name, "os-template command has no template");
                CommandExecutionResult::failure(
                    FailureKind::NoTemplate,
                    "",
                    format!("Command '{}' has no template.", parsed.name),
                )
            }
            Implementation::OsTemplate(template) => {
                let command_line = substitute(template, &parsed.args);
                self.run_os_command(&command_line)
            }
        }
    }

    fn run_os_command(&self, command_line: &str) -> CommandExecutionResult {
        debug!(command_line, "launching os command");
        let outcome = match self.runner.run_shell(command_line) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(err = %err, "process launch failed");
                return CommandExecutionResult::failure(
                    FailureKind::ProcessLaunchFailure,
                    "",
                    format!("Failed to launch command: {err:#}"),
                );
            }
        };

        if outcome.timed_out {
            return CommandExecutionResult::failure(
                FailureKind::TimedOut,
                outcome.output,
                format!("Command timed out: {command_line}"),
            );
        }
        if outcome.success {
            info!(command_line, "os command succeeded");
            return CommandExecutionResult::success(non_empty_output(outcome.output));
        }
        let error = match outcome.exit_code {
            Some(code) => format!("Command failed (exit code {code})"),
            None => "Command failed (terminated without an exit code)".to_string(),
        };
        info!(command_line, exit_code = ?outcome.exit_code, "os command failed");
        CommandExecutionResult::failure(
            FailureKind::NonZeroExit(outcome.exit_code),
            outcome.output,
            error,
        )
    }
}

fn non_empty_output(output: String) -> String {
    if output.trim().is_empty() {
        NO_OUTPUT_NOTICE.to_string()
    } else {
        output
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builtins::default_registry;
    use crate::core::registry::{CommandFlags, CommandRegistry, shared};
    use crate::io::process::ProcessOutcome;
    use crate::test_support::RecordingRunner;

    fn executor_with(registry: CommandRegistry, runner: Arc<RecordingRunner>) -> CommandExecutor {
        CommandExecutor::new(shared(registry), runner)
    }

    #[test]
    fn substitutes_template_and_runs_it() {
        let runner = Arc::new(RecordingRunner::succeeding("created\n"));
        let executor = executor_with(default_registry(), runner.clone());

        let result = executor.execute(r#"python "my script.py" --fast"#);

        assert!(result.is_success());
        assert_eq!(result.output, "created\n");
        assert_eq!(
            runner.calls(),
            vec![r#"python "my script.py" --fast"#.to_string()]
        );
    }

    #[test]
    fn unknown_and_disabled_commands_fail_without_launching() {
        let runner = Arc::new(RecordingRunner::succeeding("x"));
        let mut registry = default_registry();
        registry.set_enabled("gcc", false).expect("disable");
        let executor = executor_with(registry, runner.clone());

        let missing = executor.execute("rustc main.rs");
        assert_eq!(missing.failure, Some(FailureKind::CommandNotFound));
        assert!(missing.error.contains("rustc"));

        let disabled = executor.execute("gcc main.c");
        assert_eq!(disabled.failure, Some(FailureKind::CommandDisabled));

        let empty = executor.execute("   ");
        assert_eq!(empty.failure, Some(FailureKind::CommandNotFound));

        assert!(runner.calls().is_empty());
    }

    #[test]
    fn empty_template_is_no_template_error() {
        let runner = Arc::new(RecordingRunner::succeeding("x"));
        let mut registry = CommandRegistry::new();
        registry.upsert_template("blank", "nothing", "", CommandFlags::default());
        let executor = executor_with(registry, runner.clone());

        let result = executor.execute("blank arg");

        assert_eq!(result.failure, Some(FailureKind::NoTemplate));
        assert!(!result.error.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn non_zero_exit_keeps_output_and_reports_code() {
        let runner = Arc::new(RecordingRunner::new(vec![Ok(ProcessOutcome {
            exit_code: Some(1),
            success: false,
            output: "main.c:1: error".to_string(),
            timed_out: false,
        })]));
        let executor = executor_with(default_registry(), runner);

        let result = executor.execute("gcc main.c");

        assert_eq!(result.failure, Some(FailureKind::NonZeroExit(Some(1))));
        assert_eq!(result.error, "Command failed (exit code 1)");
        assert_eq!(result.output, "main.c:1: error");
    }

    #[test]
    fn launch_failure_and_timeout_are_distinct() {
        let runner = Arc::new(RecordingRunner::new(vec![
            Err(anyhow::anyhow!("no shell")),
            Ok(ProcessOutcome {
                exit_code: None,
                success: false,
                output: String::new(),
                timed_out: true,
            }),
        ]));
        let executor = executor_with(default_registry(), runner);

        assert_eq!(
            executor.execute("ls").failure,
            Some(FailureKind::ProcessLaunchFailure)
        );
        assert_eq!(executor.execute("ls").failure, Some(FailureKind::TimedOut));
    }

    #[test]
    fn silent_success_reports_no_output_notice() {
        let runner = Arc::new(RecordingRunner::succeeding(""));
        let executor = executor_with(default_registry(), runner);
        assert_eq!(executor.execute("mkdir out").output, NO_OUTPUT_NOTICE);
    }

    #[test]
    fn native_handler_runs_in_process() {
        let runner = Arc::new(RecordingRunner::succeeding("x"));
        let executor = executor_with(default_registry(), runner.clone());

        let result = executor.execute(r#"echo hello "big world""#);

        assert!(result.is_success());
        assert_eq!(result.output, "hello big world");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn native_errors_and_panics_become_handler_failures() {
        let mut registry = CommandRegistry::new();
        registry
            .register_native(
                "fail",
                "always fails",
                Arc::new(|_: &[String]| Err(anyhow::anyhow!("boom"))),
                CommandFlags::default(),
            )
            .expect("register");
        registry
            .register_native(
                "explode",
                "always panics",
                Arc::new(|_: &[String]| -> anyhow::Result<String> { panic!("kaboom") }),
                CommandFlags::default(),
            )
            .expect("register");
        let executor = executor_with(registry, Arc::new(RecordingRunner::succeeding("")));

        let failed = executor.execute("fail");
        assert_eq!(failed.failure, Some(FailureKind::HandlerFailed));
        assert!(failed.output.is_empty());
        assert!(failed.error.contains("boom"));

        let panicked = executor.execute("explode");
        assert_eq!(panicked.failure, Some(FailureKind::HandlerFailed));
        assert!(panicked.error.contains("kaboom"));
    }

    #[test]
    fn native_stub_is_not_executable() {
        let mut registry = CommandRegistry::new();
        registry.upsert_native_stub("ghost", "persisted only", CommandFlags::default());
        let executor = executor_with(registry, Arc::new(RecordingRunner::succeeding("")));
        assert_eq!(
            executor.execute("ghost").failure,
            Some(FailureKind::NotExecutable)
        );
    }

    #[test]
    fn help_argument_returns_help_text() {
        let runner = Arc::new(RecordingRunner::succeeding("x"));
        let executor = executor_with(default_registry(), runner.clone());

        let result = executor.execute("mkdir --help");

        assert!(result.is_success());
        assert!(result.output.contains("Command: mkdir"));
        assert!(runner.calls().is_empty());
    }
}
