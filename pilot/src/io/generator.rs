//! Text-generation capability.
//!
//! The orchestrator only sees [`TextGenerator`]. [`ProgramGenerator`] spawns
//! a configured local program, writes the conversation to its stdin and
//! takes stdout as the reply. Tests use scripted generators instead.

use std::process::Command;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::text::excerpt;
use crate::core::types::Turn;
use crate::io::config::GeneratorConfig;
use crate::io::process::run_command_with_timeout;

const STDERR_EXCERPT_CHARS: usize = 400;

/// One request: a system prompt plus the step's conversation so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("failed to launch generator: {0}")]
    Launch(String),
    #[error("generator failed: {0}")]
    Failed(String),
    #[error("generator timed out after {0:?}")]
    TimedOut(Duration),
    #[error("generator returned an empty reply")]
    EmptyReply,
    #[error("no text generator is configured")]
    Unavailable,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// False when the generator lacks what it needs to answer (program, model, key).
    fn is_configured(&self) -> bool;

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Render a request as the plain-text transcript fed to a generator program.
pub fn render_transcript(request: &GenerationRequest) -> String {
    let mut buf = String::new();
    if !request.system_prompt.trim().is_empty() {
        buf.push_str("### system\n");
        buf.push_str(request.system_prompt.trim());
        buf.push_str("\n\n");
    }
    for turn in &request.turns {
        buf.push_str("### ");
        buf.push_str(turn.role.as_str());
        buf.push('\n');
        buf.push_str(turn.text.trim());
        buf.push_str("\n\n");
    }
    buf.push_str("### model\n");
    buf
}

/// Generator backed by a local program such as `ollama run <model>`.
#[derive(Debug, Clone)]
pub struct ProgramGenerator {
    program: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ProgramGenerator {
    pub fn new(program: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            program,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(cfg: &GeneratorConfig) -> Self {
        Self::new(cfg.program.clone(), cfg.timeout(), cfg.output_limit_bytes)
    }
}

#[async_trait]
impl TextGenerator for ProgramGenerator {
    fn name(&self) -> &str {
        self.program.first().map_or("unconfigured", String::as_str)
    }

    fn is_configured(&self) -> bool {
        self.program
            .first()
            .is_some_and(|program| !program.trim().is_empty())
    }

    #[instrument(skip_all, fields(generator = %self.name(), turns = request.turns.len()))]
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let Some((program, args)) = self.program.split_first() else {
            return Err(GenerationError::Unavailable);
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        let transcript = render_transcript(&request);
        let timeout = self.timeout;
        let limit = self.output_limit_bytes;

        info!(bytes = transcript.len(), "requesting generation");
        let output = tokio::task::spawn_blocking(move || {
            run_command_with_timeout(cmd, Some(transcript.as_bytes()), timeout, limit)
        })
        .await
        .map_err(|err| GenerationError::Failed(format!("generator task aborted: {err}")))?
        .map_err(|err| GenerationError::Launch(format!("{err:#}")))?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "generator timed out");
            return Err(GenerationError::TimedOut(timeout));
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(exit_code = ?output.status.code(), "generator exited with failure");
            return Err(GenerationError::Failed(format!(
                "exit status {:?}: {}",
                output.status.code(),
                excerpt(&stderr, STDERR_EXCERPT_CHARS)
            )));
        }
        let reply = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if reply.is_empty() {
            return Err(GenerationError::EmptyReply);
        }
        debug!(chars = reply.len(), "generation complete");
        Ok(reply)
    }
}
