//! Shared deterministic types for the orchestration core.
//!
//! These types define stable contracts between the state machine, the
//! interpreter and the external caller. They carry no I/O handles.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of the single orchestrator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationState {
    Idle,
    /// A generation request for the current task is outstanding.
    Running,
    /// Suspended until the operator answers a question.
    WaitingForUser,
    /// Suspended until the operator reports a command outcome.
    WaitingForCommand,
    /// Momentary: emitted when the queue is exhausted, then reset to `Idle`.
    Finished,
}

impl OrchestrationState {
    pub fn as_str(self) -> &'static str {
        match self {
            OrchestrationState::Idle => "idle",
            OrchestrationState::Running => "running",
            OrchestrationState::WaitingForUser => "waiting_for_user",
            OrchestrationState::WaitingForCommand => "waiting_for_command",
            OrchestrationState::Finished => "finished",
        }
    }

    /// True for every state in which a run is in progress.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OrchestrationState::Running
                | OrchestrationState::WaitingForUser
                | OrchestrationState::WaitingForCommand
        )
    }
}

impl fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of one conversation turn within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Model,
    /// Orchestrator-authored context (command outcomes).
    SystemNote,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
            Role::SystemNote => "system-note",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Interpreted meaning of one text-generation reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    SuggestCommand(String),
    AskUser {
        question: String,
        default_answer: Option<String>,
    },
    None,
}

impl Directive {
    pub fn kind(&self) -> &'static str {
        match self {
            Directive::SuggestCommand(_) => "suggest_command",
            Directive::AskUser { .. } => "ask_user",
            Directive::None => "none",
        }
    }
}

/// Why a command execution did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FailureKind {
    #[error("command not found")]
    CommandNotFound,
    #[error("command disabled")]
    CommandDisabled,
    #[error("no template")]
    NoTemplate,
    /// Native command known by name only.
    #[error("not executable")]
    NotExecutable,
    #[error("handler failed")]
    HandlerFailed,
    #[error("process launch failure")]
    ProcessLaunchFailure,
    /// `None` when the process ended without an exit code.
    #[error("non-zero exit")]
    NonZeroExit(Option<i32>),
    #[error("timed out")]
    TimedOut,
    #[error("denied by operator")]
    Denied,
}

/// Outcome of one command execution. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandExecutionResult {
    pub output: String,
    /// Empty exactly when the execution succeeded.
    pub error: String,
    pub failure: Option<FailureKind>,
}

impl CommandExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: String::new(),
            failure: None,
        }
    }

    pub fn failure(kind: FailureKind, output: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            output: output.into(),
            error: if error.is_empty() {
                kind.to_string()
            } else {
                error
            },
            failure: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}
