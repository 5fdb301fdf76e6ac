//! The task-orchestration state machine.
//!
//! `Machine` is synchronous and owns the task queue and the current
//! [`StepContext`]. It never calls the text generator itself: operations that
//! need a reply return a [`Query`], and the reply comes back through
//! [`Machine::apply_reply`] tagged with the query's generation. A reply whose
//! generation is not the outstanding one is discarded.

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::core::interpreter::interpret_reply;
use crate::core::registry::{self, RegistryHandle};
use crate::core::step_context::StepContext;
use crate::core::types::{Directive, OrchestrationState, Role};
use crate::io::config::OrchestratorConfig;
use crate::io::generator::{GenerationError, GenerationRequest};
use crate::io::prompt::{CommandSummary, PromptBuilder, TaskPromptInput};
use crate::orchestrator::error::OrchestratorError;
use crate::orchestrator::events::OrchestratorEvent;
use crate::orchestrator::gate;

/// A generation request the caller must run and answer with `apply_reply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub generation: u64,
    pub request: GenerationRequest,
}

pub struct Machine {
    config: OrchestratorConfig,
    prompts: PromptBuilder,
    system_prompt: String,
    registry: RegistryHandle,
    events: mpsc::UnboundedSender<OrchestratorEvent>,
    state: OrchestrationState,
    tasks: Vec<String>,
    step: Option<StepContext>,
    generation: u64,
    outstanding: Option<u64>,
    completed: usize,
    abandoned: usize,
}

impl Machine {
    pub fn new(
        config: OrchestratorConfig,
        prompts: PromptBuilder,
        registry: RegistryHandle,
        events: mpsc::UnboundedSender<OrchestratorEvent>,
    ) -> anyhow::Result<Self> {
        let system_prompt = prompts.system_prompt()?;
        Ok(Self {
            config,
            prompts,
            system_prompt,
            registry,
            events,
            state: OrchestrationState::Idle,
            tasks: Vec::new(),
            step: None,
            generation: 0,
            outstanding: None,
            completed: 0,
            abandoned: 0,
        })
    }

    pub fn state(&self) -> OrchestrationState {
        self.state
    }

    pub fn step(&self) -> Option<&StepContext> {
        self.step.as_ref()
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    pub fn outstanding_generation(&self) -> Option<u64> {
        self.outstanding
    }

    /// Begin a run over `tasks`. No state changes on error.
    #[instrument(skip_all, fields(tasks = tasks.len()))]
    pub fn start(
        &mut self,
        tasks: Vec<String>,
        capability_ready: bool,
    ) -> Result<Query, OrchestratorError> {
        if self.state != OrchestrationState::Idle {
            warn!(state = %self.state, "start rejected: already running");
            return Err(OrchestratorError::AlreadyRunning(self.state));
        }
        if tasks.is_empty() {
            return Err(OrchestratorError::EmptyTaskList);
        }
        if !capability_ready {
            warn!("start rejected: no text generator");
            return Err(OrchestratorError::CapabilityUnavailable);
        }

        info!("orchestration started");
        self.tasks = tasks;
        self.completed = 0;
        self.abandoned = 0;
        // A non-empty queue always yields a query for its first task.
        self.begin_task(0)
            .ok_or(OrchestratorError::EmptyTaskList)
    }

    /// Abort the run. Returns false (and emits nothing) when already idle.
    pub fn stop(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }
        info!(state = %self.state, "orchestration stopped");
        self.reset();
        self.emit(OrchestratorEvent::Status("stopped".to_string()));
        self.emit(OrchestratorEvent::Finished {
            success: false,
            summary: "stopped".to_string(),
        });
        true
    }

    /// Apply a generation reply. Stale replies are dropped.
    #[instrument(skip_all, fields(generation = generation))]
    pub fn apply_reply(
        &mut self,
        generation: u64,
        reply: Result<String, GenerationError>,
    ) -> Option<Query> {
        if self.outstanding != Some(generation) || self.state != OrchestrationState::Running {
            debug!(
                outstanding = ?self.outstanding,
                state = %self.state,
                "discarding stale generation reply"
            );
            return None;
        }
        self.outstanding = None;

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                warn!(err = %err, "text generation failed; run aborted");
                self.emit(OrchestratorEvent::error(err.to_string()));
                self.reset();
                self.emit(OrchestratorEvent::Finished {
                    success: false,
                    summary: format!("Text generation failed: {err}"),
                });
                return None;
            }
        };

        let directive = interpret_reply(&reply);
        debug!(directive = directive.kind(), "interpreted reply");
        let step = self.step.as_mut()?;
        step.push(Role::Model, reply.as_str());
        step.last_directive = Some(directive.clone());
        let completes = self.prompts.policy().reply_completes(
            &step.task,
            &reply,
            &directive,
            step.failed_command_pending,
        );
        self.emit(OrchestratorEvent::message(reply));

        match directive {
            Directive::SuggestCommand(command_line) => {
                self.state = OrchestrationState::WaitingForCommand;
                self.emit(OrchestratorEvent::Status(format!(
                    "waiting for approval of `{command_line}`"
                )));
                self.emit(OrchestratorEvent::SuggestCommand(command_line));
                None
            }
            Directive::AskUser {
                question,
                default_answer,
            } => {
                self.state = OrchestrationState::WaitingForUser;
                self.emit(OrchestratorEvent::Status(
                    "waiting for an answer".to_string(),
                ));
                self.emit(OrchestratorEvent::NeedUserInput {
                    question,
                    default_answer,
                });
                None
            }
            Directive::None if completes => self.complete_step(),
            Directive::None => self.fail_round(true),
        }
    }

    /// Resume a run suspended on a question. An empty answer is valid.
    pub fn provide_user_answer(&mut self, answer: &str) -> Result<Option<Query>, OrchestratorError> {
        if self.state != OrchestrationState::WaitingForUser {
            return Err(self.reject(OrchestrationState::WaitingForUser, "user answer"));
        }
        let Some(step) = self.step.as_mut() else {
            return Err(self.reject(OrchestrationState::WaitingForUser, "user answer"));
        };
        let answer = answer.trim();
        if answer.is_empty() {
            step.push(Role::User, "(no answer)");
        } else {
            step.push(Role::User, answer);
        }
        Ok(self.issue_query())
    }

    /// Resume a run suspended on a suggested command.
    ///
    /// A non-empty `error` (including a denial) fails the round.
    #[instrument(skip_all, fields(command_line = %command_line, failed = !error.trim().is_empty()))]
    pub fn provide_command_result(
        &mut self,
        command_line: &str,
        output: &str,
        error: &str,
    ) -> Result<Option<Query>, OrchestratorError> {
        if self.state != OrchestrationState::WaitingForCommand {
            return Err(self.reject(OrchestrationState::WaitingForCommand, "command result"));
        }
        let note = self
            .prompts
            .command_result_note(command_line, output, error, self.config.context_excerpt_chars)
            .unwrap_or_else(|err| {
                warn!(err = %err, "command result template failed");
                format!("Command `{command_line}` output:\n{output}\n{error}")
            });
        let Some(step) = self.step.as_mut() else {
            return Err(self.reject(OrchestrationState::WaitingForCommand, "command result"));
        };

        let edited = step
            .suggested_command()
            .filter(|suggested| suggested.trim() != command_line.trim())
            .map(str::to_string);
        step.push(Role::SystemNote, note);

        let failed = !error.trim().is_empty();
        step.failed_command_pending = failed;
        let acknowledged = step
            .last_reply()
            .is_some_and(|reply| self.prompts.policy().acknowledges(&step.task, reply));

        if let Some(suggested) = edited {
            warn!(%suggested, "command result is for a different command line");
            self.emit(OrchestratorEvent::message(format!(
                "Result reported for `{command_line}` instead of suggested `{suggested}`"
            )));
        }

        if failed {
            if gate::is_denial(error) {
                info!(%command_line, "operator denied the command");
            }
            return Ok(self.fail_round(false));
        }
        if acknowledged || self.config.complete_on_command_success {
            return Ok(self.complete_step());
        }
        Ok(self.issue_query())
    }

    fn begin_task(&mut self, index: usize) -> Option<Query> {
        let Some(task) = self.tasks.get(index).cloned() else {
            self.finish();
            return None;
        };
        let commands = self.command_summaries();
        let prompt = self
            .prompts
            .task_prompt(&TaskPromptInput {
                task_index: index,
                tasks: &self.tasks,
                commands: &commands,
            })
            .unwrap_or_else(|err| {
                warn!(err = %err, "task template failed");
                task.clone()
            });

        info!(task_index = index, "starting task");
        self.emit(OrchestratorEvent::Status(format!(
            "task {}/{}: {task}",
            index + 1,
            self.tasks.len()
        )));
        let mut step = StepContext::new(index, task);
        step.push(Role::User, prompt);
        self.step = Some(step);
        self.issue_query()
    }

    fn issue_query(&mut self) -> Option<Query> {
        let rounds = self.step.as_ref()?.rounds;
        if rounds >= self.config.max_rounds {
            warn!(rounds, "round limit reached");
            return self.abandon_step(&format!("round limit of {rounds} reached"));
        }
        let step = self.step.as_mut()?;
        step.rounds += 1;
        self.generation += 1;
        self.outstanding = Some(self.generation);
        self.state = OrchestrationState::Running;
        debug!(generation = self.generation, round = step.rounds, "issuing query");
        Some(Query {
            generation: self.generation,
            request: GenerationRequest {
                system_prompt: self.system_prompt.clone(),
                turns: step.turns.clone(),
            },
        })
    }

    /// Count an unproductive round; abandon the task once the limit is hit.
    fn fail_round(&mut self, nudge: bool) -> Option<Query> {
        let max_attempts = self.config.max_attempts;
        let step = self.step.as_mut()?;
        step.retries += 1;
        let retries = step.retries;
        if retries >= max_attempts {
            return self.abandon_step(&format!("{retries} unproductive attempts"));
        }
        if nudge {
            let task = step.task.clone();
            let retry = self
                .prompts
                .retry_prompt(&task, retries + 1, max_attempts)
                .unwrap_or_else(|err| {
                    warn!(err = %err, "retry template failed");
                    task
                });
            if let Some(step) = self.step.as_mut() {
                step.push(Role::User, retry);
            }
        }
        debug!(retries, "retrying task");
        self.issue_query()
    }

    fn complete_step(&mut self) -> Option<Query> {
        let step = self.step.take()?;
        self.completed += 1;
        info!(task_index = step.task_index, rounds = step.rounds, "task completed");
        self.emit(OrchestratorEvent::message(format!(
            "Task {} completed: {}",
            step.task_index + 1,
            step.task
        )));
        self.begin_task(step.task_index + 1)
    }

    fn abandon_step(&mut self, reason: &str) -> Option<Query> {
        let step = self.step.take()?;
        self.abandoned += 1;
        warn!(task_index = step.task_index, reason, "task abandoned");
        self.emit(OrchestratorEvent::error(format!(
            "Task {} abandoned ({reason}): {}",
            step.task_index + 1,
            step.task
        )));
        self.begin_task(step.task_index + 1)
    }

    fn finish(&mut self) {
        self.state = OrchestrationState::Finished;
        let summary = format!(
            "{} of {} task(s) completed, {} abandoned",
            self.completed,
            self.tasks.len(),
            self.abandoned
        );
        info!(%summary, "orchestration finished");
        self.emit(OrchestratorEvent::Status("finished".to_string()));
        self.emit(OrchestratorEvent::Finished {
            success: true,
            summary,
        });
        self.reset();
    }

    fn reset(&mut self) {
        self.state = OrchestrationState::Idle;
        self.tasks.clear();
        self.step = None;
        self.outstanding = None;
    }

    fn reject(&self, expected: OrchestrationState, what: &str) -> OrchestratorError {
        warn!(%expected, actual = %self.state, what, "unexpected response ignored");
        self.emit(OrchestratorEvent::error(format!(
            "Ignored {what}: orchestrator is {}",
            self.state
        )));
        OrchestratorError::UnexpectedResponse {
            expected,
            actual: self.state,
        }
    }

    fn command_summaries(&self) -> Vec<CommandSummary> {
        registry::read(&self.registry)
            .list(false)
            .into_iter()
            .map(|descriptor| CommandSummary {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                requires_elevated_privilege: descriptor.flags.requires_elevated_privilege,
            })
            .collect()
    }

    fn emit(&self, event: OrchestratorEvent) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}
