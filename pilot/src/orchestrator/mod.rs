//! Task orchestration: the state machine plus the actor that serializes access to it.
//!
//! [`Orchestrator`] is a cheap, cloneable handle. Every operation is a
//! message to a single tokio task that owns the [`Machine`]; generation calls
//! run in spawned tasks and report back through the same queue, so state is
//! only ever touched from one place.

pub mod error;
pub mod events;
pub mod gate;
pub mod machine;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::core::registry::RegistryHandle;
use crate::core::step_context::StepContext;
use crate::core::types::OrchestrationState;
use crate::io::config::PilotConfig;
use crate::io::generator::{GenerationError, TextGenerator};
use crate::io::prompt::PromptBuilder;

pub use error::OrchestratorError;
pub use events::OrchestratorEvent;
pub use machine::{Machine, Query};

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: OrchestrationState,
    pub tasks: Vec<String>,
    pub step: Option<StepContext>,
}

type Reply<T> = oneshot::Sender<T>;

enum Message {
    Start {
        tasks: Vec<String>,
        reply: Reply<Result<(), OrchestratorError>>,
    },
    Stop {
        reply: Reply<bool>,
    },
    UserAnswer {
        answer: String,
        reply: Reply<Result<(), OrchestratorError>>,
    },
    CommandResult {
        command_line: String,
        output: String,
        error: String,
        reply: Reply<Result<(), OrchestratorError>>,
    },
    Snapshot {
        reply: Reply<Snapshot>,
    },
    SetGenerator {
        generator: Option<Arc<dyn TextGenerator>>,
        reply: Reply<()>,
    },
    Generated {
        generation: u64,
        result: Result<String, GenerationError>,
    },
}

#[derive(Clone)]
pub struct Orchestrator {
    tx: mpsc::UnboundedSender<Message>,
}

impl Orchestrator {
    /// Spawn the orchestrator actor on the current tokio runtime.
    ///
    /// The actor runs until every handle is dropped and no generation is in flight.
    pub fn spawn(
        generator: Option<Arc<dyn TextGenerator>>,
        registry: RegistryHandle,
        config: &PilotConfig,
    ) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<OrchestratorEvent>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let prompts = PromptBuilder::new(
            config.completion.clone(),
            config.orchestrator.system_prompt.clone(),
        )?;
        let machine = Machine::new(config.orchestrator.clone(), prompts, registry, event_tx)?;
        let (tx, inbox) = mpsc::unbounded_channel();
        let actor = Actor {
            machine,
            generator,
            inbox,
            outbox: tx.downgrade(),
        };
        tokio::spawn(actor.run());
        Ok((Self { tx }, event_rx))
    }

    pub async fn start(&self, tasks: Vec<String>) -> Result<(), OrchestratorError> {
        self.request(|reply| Message::Start { tasks, reply }).await?
    }

    /// Stop the current run. Returns false when nothing was running.
    pub async fn stop(&self) -> Result<bool, OrchestratorError> {
        self.request(|reply| Message::Stop { reply }).await
    }

    pub async fn provide_user_answer(&self, answer: &str) -> Result<(), OrchestratorError> {
        let answer = answer.to_string();
        self.request(|reply| Message::UserAnswer { answer, reply })
            .await?
    }

    pub async fn provide_command_result(
        &self,
        command_line: &str,
        output: &str,
        error: &str,
    ) -> Result<(), OrchestratorError> {
        let (command_line, output, error) =
            (command_line.to_string(), output.to_string(), error.to_string());
        self.request(|reply| Message::CommandResult {
            command_line,
            output,
            error,
            reply,
        })
        .await?
    }

    pub async fn state(&self) -> Result<OrchestrationState, OrchestratorError> {
        Ok(self.snapshot().await?.state)
    }

    pub async fn snapshot(&self) -> Result<Snapshot, OrchestratorError> {
        self.request(|reply| Message::Snapshot { reply }).await
    }

    /// Replace the text generator used by subsequent queries.
    pub async fn set_generator(
        &self,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Result<(), OrchestratorError> {
        self.request(|reply| Message::SetGenerator { generator, reply })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Message,
    ) -> Result<T, OrchestratorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| OrchestratorError::Shutdown)?;
        rx.await.map_err(|_| OrchestratorError::Shutdown)
    }
}

struct Actor {
    machine: Machine,
    generator: Option<Arc<dyn TextGenerator>>,
    inbox: mpsc::UnboundedReceiver<Message>,
    // Weak so the actor does not keep itself alive.
    outbox: mpsc::WeakUnboundedSender<Message>,
}

impl Actor {
    async fn run(mut self) {
        debug!("orchestrator actor started");
        while let Some(message) = self.inbox.recv().await {
            self.handle(message);
        }
        debug!("orchestrator actor stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Start { tasks, reply } => {
                let ready = self
                    .generator
                    .as_ref()
                    .is_some_and(|generator| generator.is_configured());
                let result = self.machine.start(tasks, ready).map(|query| {
                    self.dispatch(Some(query));
                });
                respond(reply, result);
            }
            Message::Stop { reply } => {
                let stopped = self.machine.stop();
                respond(reply, stopped);
            }
            Message::UserAnswer { answer, reply } => {
                let result = self
                    .machine
                    .provide_user_answer(&answer)
                    .map(|query| self.dispatch(query));
                respond(reply, result);
            }
            Message::CommandResult {
                command_line,
                output,
                error,
                reply,
            } => {
                let result = self
                    .machine
                    .provide_command_result(&command_line, &output, &error)
                    .map(|query| self.dispatch(query));
                respond(reply, result);
            }
            Message::Snapshot { reply } => {
                let snapshot = Snapshot {
                    state: self.machine.state(),
                    tasks: self.machine.tasks().to_vec(),
                    step: self.machine.step().cloned(),
                };
                respond(reply, snapshot);
            }
            Message::SetGenerator { generator, reply } => {
                info!(
                    generator = generator.as_ref().map_or("none", |g| g.name()),
                    "text generator replaced"
                );
                self.generator = generator;
                respond(reply, ());
            }
            Message::Generated { generation, result } => {
                let next = self.machine.apply_reply(generation, result);
                self.dispatch(next);
            }
        }
    }

    /// Run `query` on the generator in the background.
    fn dispatch(&mut self, mut query: Option<Query>) {
        while let Some(current) = query.take() {
            let Some(generator) = self.generator.clone() else {
                warn!("text generator removed mid-run");
                query = self
                    .machine
                    .apply_reply(current.generation, Err(GenerationError::Unavailable));
                continue;
            };
            let Some(outbox) = self.outbox.upgrade() else {
                debug!("orchestrator shutting down; query dropped");
                return;
            };
            debug!(generation = current.generation, generator = generator.name(), "dispatching query");
            tokio::spawn(async move {
                let result = generator.generate(current.request).await;
                let message = Message::Generated {
                    generation: current.generation,
                    result,
                };
                if outbox.send(message).is_err() {
                    debug!("orchestrator gone before reply arrived");
                }
            });
        }
    }
}

fn respond<T>(reply: Reply<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("caller dropped before reply");
    }
}
