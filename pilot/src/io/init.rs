//! Initialization helpers for `.pilot/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::command_store::save_commands;
use super::config::{PilotConfig, write_config};
use crate::core::builtins::default_registry;

/// Canonical paths within `.pilot/` for a project root.
#[derive(Debug, Clone)]
pub struct PilotPaths {
    pub root: PathBuf,
    pub pilot_dir: PathBuf,
    pub config_path: PathBuf,
}

impl PilotPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let pilot_dir = root.join(".pilot");
        Self {
            root: root.clone(),
            config_path: pilot_dir.join("config.toml"),
            pilot_dir,
        }
    }

    /// Command file named by `cfg`, resolved against the project root.
    pub fn commands_path(&self, cfg: &PilotConfig) -> PathBuf {
        if cfg.commands_path.is_absolute() {
            cfg.commands_path.clone()
        } else {
            self.root.join(&cfg.commands_path)
        }
    }
}

/// Options for `init_pilot`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing pilot-owned files.
    pub force: bool,
}

/// Create `.pilot/` with a default config and the default command set.
///
/// Fails if `.pilot/` already exists unless `options.force` is set.
pub fn init_pilot(root: &Path, options: &InitOptions) -> Result<PilotPaths> {
    let paths = PilotPaths::new(root);
    if paths.pilot_dir.exists() && !paths.pilot_dir.is_dir() {
        return Err(anyhow!("pilot init: .pilot exists but is not a directory"));
    }
    if paths.pilot_dir.exists() && !options.force {
        return Err(anyhow!(
            "pilot init: .pilot already exists (use --force to overwrite)"
        ));
    }

    fs::create_dir_all(&paths.pilot_dir)
        .with_context(|| format!("create directory {}", paths.pilot_dir.display()))?;

    let cfg = PilotConfig::default();
    write_config(&paths.config_path, &cfg)?;
    save_commands(&paths.commands_path(&cfg), &default_registry())?;

    Ok(paths)
}
