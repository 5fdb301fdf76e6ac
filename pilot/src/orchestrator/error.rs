use thiserror::Error;

use crate::core::types::OrchestrationState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("orchestration already running (state: {0})")]
    AlreadyRunning(OrchestrationState),
    #[error("task list is empty")]
    EmptyTaskList,
    #[error("text generation capability is unavailable")]
    CapabilityUnavailable,
    #[error("unexpected response: expected state {expected}, but orchestrator is {actual}")]
    UnexpectedResponse {
        expected: OrchestrationState,
        actual: OrchestrationState,
    },
    #[error("orchestrator has shut down")]
    Shutdown,
}
