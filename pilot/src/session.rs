//! One interactive orchestration run, end to end.
//!
//! `run_session` plays the external caller of the approval gate: it consumes
//! orchestrator events, asks the [`Operator`] about every suspension, runs
//! approved commands on a blocking worker and reports the outcome back.

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::core::command_line::parse_command_line;
use crate::core::registry;
use crate::io::executor::CommandExecutor;
use crate::io::operator::{Approval, Operator};
use crate::orchestrator::gate;
use crate::orchestrator::{Orchestrator, OrchestratorEvent};

/// Summary of a `run_session` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub success: bool,
    pub summary: String,
    pub commands_run: u32,
    pub commands_denied: u32,
    pub questions_answered: u32,
}

/// Start a run over `tasks` and drive it until the orchestrator finishes.
///
/// Stops early only if the event stream closes or the operator fails (for
/// example, the terminal goes away).
#[instrument(skip_all, fields(tasks = tasks.len()))]
pub async fn run_session<O: Operator>(
    orchestrator: &Orchestrator,
    events: &mut mpsc::UnboundedReceiver<OrchestratorEvent>,
    executor: &CommandExecutor,
    operator: &mut O,
    tasks: Vec<String>,
) -> Result<SessionOutcome> {
    orchestrator
        .start(tasks)
        .await
        .context("start orchestration")?;

    let mut commands_run = 0u32;
    let mut commands_denied = 0u32;
    let mut questions_answered = 0u32;

    while let Some(event) = events.recv().await {
        match event {
            OrchestratorEvent::SuggestCommand(command_line) => {
                let (command_line, result) =
                    match review(operator, executor, command_line.clone()).await? {
                    Approval::Approved(approved) => {
                        info!(command_line = %approved, "running approved command");
                        let worker = executor.clone();
                        let line = approved.clone();
                        let result = tokio::task::spawn_blocking(move || worker.execute(&line))
                            .await
                            .context("command worker")?;
                        operator
                            .show_command_output(&result.output, &result.error)
                            .await?;
                        commands_run += 1;
                        (approved, result)
                    }
                    Approval::Denied => {
                        info!(%command_line, "command denied");
                        commands_denied += 1;
                        let result = gate::denied(&command_line);
                        (command_line, result)
                    }
                };
                orchestrator
                    .provide_command_result(&command_line, &result.output, &result.error)
                    .await?;
            }
            OrchestratorEvent::NeedUserInput {
                question,
                default_answer,
            } => {
                let answer = operator
                    .answer_question(&question, default_answer.as_deref())
                    .await
                    .context("answer question")?;
                questions_answered += 1;
                orchestrator.provide_user_answer(&answer).await?;
            }
            OrchestratorEvent::Finished { success, summary } => {
                operator
                    .notify(&OrchestratorEvent::Finished {
                        success,
                        summary: summary.clone(),
                    })
                    .await?;
                debug!(success, "session finished");
                return Ok(SessionOutcome {
                    success,
                    summary,
                    commands_run,
                    commands_denied,
                    questions_answered,
                });
            }
            other => operator.notify(&other).await?,
        }
    }
    bail!("orchestrator stopped before the run finished")
}

/// Ask the operator about `command_line` until the verdict is stable.
///
/// An approved line that was edited into a privileged command is reviewed
/// again as privileged, so the second confirmation cannot be skipped.
async fn review<O: Operator>(
    operator: &mut O,
    executor: &CommandExecutor,
    mut command_line: String,
) -> Result<Approval> {
    loop {
        let privileged = requires_elevated_privilege(executor, &command_line);
        let approval = operator
            .review_command(&command_line, privileged)
            .await
            .context("review command")?;
        match approval {
            Approval::Approved(approved)
                if approved.trim() != command_line.trim()
                    && requires_elevated_privilege(executor, &approved) =>
            {
                debug!(%approved, "edited line needs elevated privilege; reviewing again");
                command_line = approved;
            }
            other => return Ok(other),
        }
    }
}

/// Parse a task list: one task per line, blank lines and `#` comments skipped.
pub fn parse_task_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn requires_elevated_privilege(executor: &CommandExecutor, command_line: &str) -> bool {
    let Some(parsed) = parse_command_line(command_line) else {
        return false;
    };
    registry::read(executor.registry())
        .get(&parsed.name)
        .is_some_and(|descriptor| descriptor.flags.requires_elevated_privilege)
}
