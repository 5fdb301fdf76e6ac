//! Pilot configuration stored under `.pilot/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::completion::CompletionPolicy;

/// Pilot configuration (TOML).
///
/// Edited by humans; every field has a default so a partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PilotConfig {
    /// Command configuration file, relative to the project root.
    pub commands_path: PathBuf,
    pub orchestrator: OrchestratorConfig,
    pub completion: CompletionPolicy,
    pub generator: GeneratorConfig,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Unproductive rounds allowed per task before it is abandoned.
    pub max_attempts: u32,
    /// Hard bound on rounds of any kind per task.
    pub max_rounds: u32,
    /// Treat a successful command result as completing the step.
    pub complete_on_command_success: bool,
    /// Command output is cut to this many characters before it enters the conversation.
    pub context_excerpt_chars: usize,
    /// Replaces the bundled system prompt when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Program (and leading arguments) that answers a transcript on stdin.
    /// Empty means no generator is configured.
    pub program: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            commands_path: PathBuf::from(".pilot/commands.json"),
            orchestrator: OrchestratorConfig::default(),
            completion: CompletionPolicy::default(),
            generator: GeneratorConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_rounds: 12,
            complete_on_command_success: true,
            context_excerpt_chars: 300,
            system_prompt: None,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            program: Vec::new(),
            timeout_secs: 300,
            output_limit_bytes: 200_000,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            output_limit_bytes: 100_000,
        }
    }
}

impl GeneratorConfig {
    pub fn is_configured(&self) -> bool {
        self.program
            .first()
            .is_some_and(|program| !program.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PilotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.commands_path.as_os_str().is_empty() {
            return Err(anyhow!("commands_path must not be empty"));
        }
        let orchestrator = &self.orchestrator;
        if orchestrator.max_attempts == 0 {
            return Err(anyhow!("orchestrator.max_attempts must be > 0"));
        }
        if orchestrator.max_rounds < orchestrator.max_attempts {
            return Err(anyhow!(
                "orchestrator.max_rounds ({}) must be >= orchestrator.max_attempts ({})",
                orchestrator.max_rounds,
                orchestrator.max_attempts
            ));
        }
        if orchestrator.context_excerpt_chars == 0 {
            return Err(anyhow!("orchestrator.context_excerpt_chars must be > 0"));
        }
        if self.completion.acknowledgement.trim().is_empty() {
            return Err(anyhow!("completion.acknowledgement must not be empty"));
        }
        if self.completion.task_reference_chars == 0 {
            return Err(anyhow!("completion.task_reference_chars must be > 0"));
        }
        if !self.generator.program.is_empty() && !self.generator.is_configured() {
            return Err(anyhow!("generator.program must start with a program name"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        if self.executor.timeout_secs == 0 {
            return Err(anyhow!("executor.timeout_secs must be > 0"));
        }
        if self.executor.output_limit_bytes == 0 {
            return Err(anyhow!("executor.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        let cfg = PilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename it into place.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PilotConfig::default());
        assert!(!cfg.generator.is_configured());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = PilotConfig::default();
        cfg.generator.program = vec!["ollama".to_string(), "run".to_string(), "llama3".to_string()];
        cfg.orchestrator.system_prompt = Some("Be brief.".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert!(!temp.path().join("config.toml.tmp").exists());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[orchestrator]\nmax_attempts = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.orchestrator.max_attempts, 5);
        assert_eq!(cfg.orchestrator.max_rounds, 12);
        assert_eq!(cfg.completion, CompletionPolicy::default());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[orchestrator]\nmax_attempts = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_attempts must be > 0"));

        let mut cfg = PilotConfig::default();
        cfg.orchestrator.max_rounds = 2;
        assert!(cfg.validate().is_err());

        let mut cfg = PilotConfig::default();
        cfg.generator.program = vec![" ".to_string()];
        assert!(cfg.validate().is_err());
    }
}
