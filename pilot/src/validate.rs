//! Validation helpers for `pilot validate`.

use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::registry::CommandKind;
use crate::io::command_store::read_command_file;
use crate::project::Project;

/// Summary of a valid `.pilot/` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateOutcome {
    pub commands: usize,
    pub enabled: usize,
    /// Native records in the file with no in-process handler behind them.
    pub stubs: Vec<String>,
    pub generator_configured: bool,
}

/// Validate `.pilot/` layout, config and command file.
pub fn validate_pilot(root: &Path) -> Result<ValidateOutcome> {
    let project = Project::load(root)?;
    ensure_dir(&project.paths.pilot_dir)?;
    ensure_file(&project.paths.config_path)?;
    ensure_file(&project.commands_path)?;

    // Reading again applies the schema and the duplicate-name check to the file itself.
    let file = read_command_file(&project.commands_path)?
        .with_context(|| format!("read {}", project.commands_path.display()))?;
    for record in &file.commands {
        if record.kind == CommandKind::OsTemplate
            && record.template.as_deref().is_none_or(|t| t.trim().is_empty())
        {
            return Err(anyhow!("command '{}' has an empty template", record.name));
        }
    }

    Ok(ValidateOutcome {
        commands: project.registry.len(),
        enabled: project.registry.list(false).len(),
        stubs: project.load_report.stubs.clone(),
        generator_configured: project.config.generator.is_configured(),
    })
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("missing directory {}", path.display()));
    }
    if !path.is_dir() {
        return Err(anyhow!("expected directory {}", path.display()));
    }
    Ok(())
}

fn ensure_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(anyhow!("missing file {}", path.display()));
    }
    if !path.is_file() {
        return Err(anyhow!("expected file {}", path.display()));
    }
    Ok(())
}
