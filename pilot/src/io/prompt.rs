//! Prompt rendering for text-generation requests.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::completion::CompletionPolicy;
use crate::core::text::excerpt;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const RETRY_TEMPLATE: &str = include_str!("prompts/retry.md");
const COMMAND_RESULT_TEMPLATE: &str = include_str!("prompts/command_result.md");

/// A command as advertised to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSummary {
    pub name: String,
    pub description: String,
    pub requires_elevated_privilege: bool,
}

/// Inputs for the first prompt of a task.
#[derive(Debug, Clone)]
pub struct TaskPromptInput<'a> {
    pub task_index: usize,
    pub tasks: &'a [String],
    pub commands: &'a [CommandSummary],
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptBuilder {
    env: Environment<'static>,
    policy: CompletionPolicy,
    system_override: Option<String>,
}

impl PromptBuilder {
    pub fn new(policy: CompletionPolicy, system_override: Option<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("task", TASK_TEMPLATE)
            .context("load task template")?;
        env.add_template("retry", RETRY_TEMPLATE)
            .context("load retry template")?;
        env.add_template("command_result", COMMAND_RESULT_TEMPLATE)
            .context("load command result template")?;
        Ok(Self {
            env,
            policy,
            system_override: system_override.filter(|text| !text.trim().is_empty()),
        })
    }

    pub fn policy(&self) -> &CompletionPolicy {
        &self.policy
    }

    pub fn system_prompt(&self) -> Result<String> {
        if let Some(text) = &self.system_override {
            return Ok(text.trim().to_string());
        }
        let rendered = self.env.get_template("system")?.render(context! {
            acknowledgement => self.policy.acknowledgement.trim(),
        })?;
        Ok(rendered.trim().to_string())
    }

    pub fn task_prompt(&self, input: &TaskPromptInput<'_>) -> Result<String> {
        let task = input
            .tasks
            .get(input.task_index)
            .map(String::as_str)
            .unwrap_or_default();
        let rendered = self.env.get_template("task")?.render(context! {
            task => task.trim(),
            position => input.task_index + 1,
            total => input.tasks.len(),
            tasks => input.tasks,
            commands => input.commands,
            acknowledgement => self.policy.acknowledgement.trim(),
            task_reference => self.task_reference(task),
        })?;
        Ok(rendered.trim().to_string())
    }

    pub fn retry_prompt(&self, task: &str, attempt: u32, max_attempts: u32) -> Result<String> {
        let rendered = self.env.get_template("retry")?.render(context! {
            task => task.trim(),
            attempt => attempt,
            max_attempts => max_attempts,
            acknowledgement => self.policy.acknowledgement.trim(),
            task_reference => self.task_reference(task),
        })?;
        Ok(rendered.trim().to_string())
    }

    /// System note describing a command outcome. `output` is cut to `excerpt_chars`.
    pub fn command_result_note(
        &self,
        command_line: &str,
        output: &str,
        error: &str,
        excerpt_chars: usize,
    ) -> Result<String> {
        let output = excerpt(output, excerpt_chars);
        let rendered = self.env.get_template("command_result")?.render(context! {
            command_line => command_line.trim(),
            succeeded => error.trim().is_empty(),
            error => error.trim(),
            output => (!output.is_empty()).then_some(output),
        })?;
        Ok(rendered.trim().to_string())
    }

    /// Leading characters of the task an acknowledgement must quote.
    fn task_reference(&self, task: &str) -> String {
        let reference: String = task
            .trim()
            .chars()
            .take(self.policy.task_reference_chars)
            .collect();
        reference.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PromptBuilder {
        PromptBuilder::new(CompletionPolicy::default(), None).expect("templates")
    }

    fn tasks() -> Vec<String> {
        vec![
            "Create directory reports".to_string(),
            "Compile main.c with gcc".to_string(),
        ]
    }

    #[test]
    fn task_prompt_lists_tasks_commands_and_acknowledgement() {
        let commands = vec![
            CommandSummary {
                name: "mkdir".to_string(),
                description: "Creates a directory.".to_string(),
                requires_elevated_privilege: false,
            },
            CommandSummary {
                name: "mount".to_string(),
                description: "Mounts a volume.".to_string(),
                requires_elevated_privilege: true,
            },
        ];
        let tasks = tasks();
        let prompt = builder()
            .task_prompt(&TaskPromptInput {
                task_index: 1,
                tasks: &tasks,
                commands: &commands,
            })
            .expect("render");

        assert!(prompt.starts_with("Task 2 of 2: Compile main.c with gcc"));
        assert!(prompt.contains("1. Create directory reports"));
        assert!(prompt.contains("- mkdir: Creates a directory."));
        assert!(prompt.contains("- mount: Mounts a volume. (requires elevated privilege)"));
        assert!(!prompt.contains("- mkdir: Creates a directory. (requires"));
        assert!(prompt.contains("Task completed successfully for: Compile main.c with"));
    }

    #[test]
    fn acknowledgement_in_prompt_satisfies_policy() {
        let tasks = tasks();
        let builder = builder();
        let prompt = builder
            .task_prompt(&TaskPromptInput {
                task_index: 0,
                tasks: &tasks,
                commands: &[],
            })
            .expect("render");
        let last_line = prompt.lines().last().expect("line");
        assert!(builder.policy().acknowledges(&tasks[0], last_line));
        assert!(prompt.contains("No local commands are available"));
    }

    #[test]
    fn system_prompt_override_wins() {
        let default = builder().system_prompt().expect("render");
        assert!(default.contains("COMMAND:"));
        assert!(default.contains("Task completed successfully for:"));

        let custom = PromptBuilder::new(CompletionPolicy::default(), Some("Be terse.".into()))
            .expect("templates");
        assert_eq!(custom.system_prompt().expect("render"), "Be terse.");
    }

    #[test]
    fn command_note_reports_failure_and_excerpt() {
        let note = builder()
            .command_result_note("gcc main.c", &"x".repeat(50), "Command failed (exit code 1)", 10)
            .expect("render");
        assert!(note.starts_with("Command `gcc main.c` failed: Command failed (exit code 1)"));
        assert!(note.contains("xxxxxxxxxx..."));

        let ok = builder()
            .command_result_note("mkdir out", "", "", 10)
            .expect("render");
        assert_eq!(ok, "Command `mkdir out` succeeded.");
    }

    #[test]
    fn retry_prompt_mentions_attempts() {
        let retry = builder()
            .retry_prompt("Explain X", 2, 3)
            .expect("render");
        assert!(retry.contains("attempt 2 of 3"));
        assert!(retry.contains("Task completed successfully for: Explain X"));
    }
}
