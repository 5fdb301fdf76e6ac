//! Events the orchestrator emits to its caller.

/// Everything the caller (UI, session driver, test) can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    Status(String),
    Message {
        text: String,
        is_error: bool,
    },
    /// The orchestrator is `WaitingForUser`; answer with `provide_user_answer`.
    NeedUserInput {
        question: String,
        default_answer: Option<String>,
    },
    /// The orchestrator is `WaitingForCommand`; answer with `provide_command_result`.
    SuggestCommand(String),
    Finished {
        success: bool,
        summary: String,
    },
}

impl OrchestratorEvent {
    pub fn message(text: impl Into<String>) -> Self {
        OrchestratorEvent::Message {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        OrchestratorEvent::Message {
            text: text.into(),
            is_error: true,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, OrchestratorEvent::Finished { .. })
    }
}
