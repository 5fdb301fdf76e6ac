//! The human side of the approval gate.
//!
//! [`run_session`](crate::session::run_session) consults an [`Operator`] whenever
//! the orchestrator suspends. [`TerminalOperator`] asks on a line-oriented
//! terminal; tests script the answers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tracing::debug;

use crate::orchestrator::OrchestratorEvent;

/// Operator verdict on a suggested command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Approval {
    /// Run this command line (possibly edited from the suggestion).
    Approved(String),
    Denied,
}

#[async_trait]
pub trait Operator: Send {
    /// Decide on a suggested command. Privileged commands need a second confirmation.
    async fn review_command(
        &mut self,
        command_line: &str,
        requires_elevated_privilege: bool,
    ) -> Result<Approval>;

    /// Answer a question. An empty answer is valid.
    async fn answer_question(&mut self, question: &str, default_answer: Option<&str>)
    -> Result<String>;

    /// Show an informational event (status, message, command output, outcome).
    async fn notify(&mut self, event: &OrchestratorEvent) -> Result<()>;

    /// Show the outcome of a command the operator approved.
    async fn show_command_output(&mut self, output: &str, error: &str) -> Result<()>;
}

/// Operator reading answers line by line from `reader` and writing prompts to `out`.
pub struct TerminalOperator<R, W> {
    lines: Lines<R>,
    out: W,
}

impl TerminalOperator<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> TerminalOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, out: W) -> Self {
        Self {
            lines: reader.lines(),
            out,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    async fn say(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .await
            .context("write to terminal")?;
        self.out.flush().await.context("flush terminal")
    }

    /// Print `prompt` and read one line. `None` on end of input.
    async fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        self.say(prompt).await?;
        let line = self.lines.next_line().await.context("read from terminal")?;
        Ok(line.map(|line| line.trim().to_string()))
    }

    async fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let answer = self.ask(prompt).await?.unwrap_or_default();
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }
}

#[async_trait]
impl<R, W> Operator for TerminalOperator<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn review_command(
        &mut self,
        command_line: &str,
        requires_elevated_privilege: bool,
    ) -> Result<Approval> {
        self.say(&format!("\nSuggested command: {command_line}\n"))
            .await?;
        let mut line = command_line.to_string();
        loop {
            let Some(choice) = self.ask("Run it? [y]es / [n]o / [e]dit: ").await? else {
                debug!("end of input while reviewing command");
                return Ok(Approval::Denied);
            };
            match choice.to_lowercase().as_str() {
                "y" | "yes" => break,
                "n" | "no" | "" => return Ok(Approval::Denied),
                "e" | "edit" => {
                    let Some(edited) = self.ask("Command line: ").await? else {
                        return Ok(Approval::Denied);
                    };
                    if !edited.is_empty() {
                        line = edited;
                    }
                    self.say(&format!("Command: {line}\n")).await?;
                }
                _ => self.say("Please answer y, n or e.\n").await?,
            }
        }
        if requires_elevated_privilege
            && !self
                .confirm("This command requires elevated privilege. Really run it? [y/N]: ")
                .await?
        {
            return Ok(Approval::Denied);
        }
        Ok(Approval::Approved(line))
    }

    async fn answer_question(
        &mut self,
        question: &str,
        default_answer: Option<&str>,
    ) -> Result<String> {
        self.say(&format!("\nQuestion: {question}\n")).await?;
        let prompt = match default_answer {
            Some(default) => format!("Answer [{default}]: "),
            None => "Answer: ".to_string(),
        };
        let answer = self.ask(&prompt).await?.unwrap_or_default();
        if answer.is_empty() {
            return Ok(default_answer.unwrap_or_default().to_string());
        }
        Ok(answer)
    }

    async fn notify(&mut self, event: &OrchestratorEvent) -> Result<()> {
        let text = match event {
            OrchestratorEvent::Status(status) => format!("[{status}]\n"),
            OrchestratorEvent::Message { text, is_error } if *is_error => {
                format!("error: {text}\n")
            }
            OrchestratorEvent::Message { text, .. } => format!("{text}\n"),
            OrchestratorEvent::Finished { success, summary } => {
                let label = if *success { "finished" } else { "not finished" };
                format!("\n{label}: {summary}\n")
            }
            OrchestratorEvent::NeedUserInput { .. } | OrchestratorEvent::SuggestCommand(_) => {
                return Ok(());
            }
        };
        self.say(&text).await
    }

    async fn show_command_output(&mut self, output: &str, error: &str) -> Result<()> {
        let mut text = String::new();
        if !output.trim().is_empty() {
            text.push_str(output.trim_end());
            text.push('\n');
        }
        if !error.trim().is_empty() {
            text.push_str(&format!("error: {}\n", error.trim()));
        }
        self.say(&text).await
    }
}
