//! Scripted doubles for the generator, the process runner and the operator.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::io::generator::{GenerationError, GenerationRequest, TextGenerator};
use crate::io::init::{InitOptions, PilotPaths, init_pilot};
use crate::io::operator::{Approval, Operator};
use crate::io::process::{ProcessOutcome, ProcessRunner};
use crate::orchestrator::OrchestratorEvent;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A temporary project root with `.pilot/` initialized.
pub fn initialized_project() -> Result<(tempfile::TempDir, PilotPaths)> {
    let temp = tempfile::tempdir()?;
    let paths = init_pilot(temp.path(), &InitOptions { force: false })?;
    Ok((temp, paths))
}

/// Generator that answers from a queue and records every request.
///
/// Once the queue is empty every call fails with `GenerationError::Failed`.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    configured: bool,
    release: Option<Arc<Semaphore>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|reply| Ok(reply.into())))
    }

    pub fn with_results(replies: impl IntoIterator<Item = Result<String, GenerationError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            configured: true,
            release: None,
        }
    }

    /// A generator that reports itself as not configured.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::with_results(Vec::new())
        }
    }

    /// Every reply waits for a permit on the returned semaphore.
    pub fn held<I, S>(replies: I) -> (Self, Arc<Semaphore>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let release = Arc::new(Semaphore::new(0));
        let generator = Self {
            release: Some(release.clone()),
            ..Self::new(replies)
        };
        (generator, release)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        lock(&self.requests).push(request);
        if let Some(release) = &self.release {
            let permit = release
                .acquire()
                .await
                .map_err(|_| GenerationError::Failed("release closed".to_string()))?;
            permit.forget();
        }
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Failed("script exhausted".to_string())))
    }
}

/// Process runner that records command lines instead of running them.
pub struct RecordingRunner {
    outcomes: Mutex<VecDeque<Result<ProcessOutcome>>>,
    fallback_output: String,
    calls: Mutex<Vec<String>>,
}

impl RecordingRunner {
    /// Returns `outcomes` in order, then succeeds with empty output.
    pub fn new(outcomes: Vec<Result<ProcessOutcome>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            fallback_output: String::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every call succeeds with `output`.
    pub fn succeeding(output: &str) -> Self {
        Self {
            fallback_output: output.to_string(),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

impl ProcessRunner for RecordingRunner {
    fn run_shell(&self, command_line: &str) -> Result<ProcessOutcome> {
        lock(&self.calls).push(command_line.to_string());
        lock(&self.outcomes).pop_front().unwrap_or_else(|| {
            Ok(ProcessOutcome {
                exit_code: Some(0),
                success: true,
                output: self.fallback_output.clone(),
                timed_out: false,
            })
        })
    }
}

/// Operator that answers from queues and records what it was shown.
///
/// With an empty queue, commands are denied and questions get an empty answer.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    pub approvals: VecDeque<Approval>,
    pub answers: VecDeque<String>,
    pub reviewed: Vec<(String, bool)>,
    pub questions: Vec<(String, Option<String>)>,
    pub notices: Vec<OrchestratorEvent>,
    pub outputs: Vec<(String, String)>,
}

impl ScriptedOperator {
    pub fn new(approvals: Vec<Approval>, answers: Vec<&str>) -> Self {
        Self {
            approvals: approvals.into(),
            answers: answers.into_iter().map(str::to_string).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn review_command(
        &mut self,
        command_line: &str,
        requires_elevated_privilege: bool,
    ) -> Result<Approval> {
        self.reviewed
            .push((command_line.to_string(), requires_elevated_privilege));
        Ok(self.approvals.pop_front().unwrap_or(Approval::Denied))
    }

    async fn answer_question(
        &mut self,
        question: &str,
        default_answer: Option<&str>,
    ) -> Result<String> {
        self.questions
            .push((question.to_string(), default_answer.map(str::to_string)));
        Ok(self.answers.pop_front().unwrap_or_default())
    }

    async fn notify(&mut self, event: &OrchestratorEvent) -> Result<()> {
        self.notices.push(event.clone());
        Ok(())
    }

    async fn show_command_output(&mut self, output: &str, error: &str) -> Result<()> {
        self.outputs.push((output.to_string(), error.to_string()));
        Ok(())
    }
}
