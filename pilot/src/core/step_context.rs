//! Per-task conversation state.

use crate::core::types::{Directive, Role, Turn};

/// Everything the orchestrator remembers about the task in progress.
///
/// Created when a task begins and dropped when it completes or is abandoned;
/// nothing here survives into the next task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    /// Zero-based position of the task in the run.
    pub task_index: usize,
    pub task: String,
    pub turns: Vec<Turn>,
    /// Unproductive rounds so far (incomplete replies, failed command results).
    pub retries: u32,
    /// All rounds so far, productive or not.
    pub rounds: u32,
    pub last_directive: Option<Directive>,
    /// Set while the most recent command result of this step carried an error.
    pub failed_command_pending: bool,
}

impl StepContext {
    pub fn new(task_index: usize, task: impl Into<String>) -> Self {
        Self {
            task_index,
            task: task.into(),
            turns: Vec::new(),
            retries: 0,
            rounds: 0,
            last_directive: None,
            failed_command_pending: false,
        }
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn::new(role, text));
    }

    /// Text of the most recent model turn, if any.
    pub fn last_reply(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Model)
            .map(|turn| turn.text.as_str())
    }

    /// The command suggested by the most recent reply, if it suggested one.
    pub fn suggested_command(&self) -> Option<&str> {
        match &self.last_directive {
            Some(Directive::SuggestCommand(line)) => Some(line.as_str()),
            _ => None,
        }
    }
}
