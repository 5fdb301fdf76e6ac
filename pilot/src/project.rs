//! Loading a project's `.pilot/` state for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::registry::{self, CommandRegistry, RegistryHandle};
use crate::io::command_store::{LoadReport, load_registry, save_commands};
use crate::io::config::{PilotConfig, load_config};
use crate::io::executor::CommandExecutor;
use crate::io::init::PilotPaths;
use crate::io::process::ShellRunner;

/// Config plus command registry for one project root.
#[derive(Debug)]
pub struct Project {
    pub paths: PilotPaths,
    pub config: PilotConfig,
    pub commands_path: PathBuf,
    pub registry: CommandRegistry,
    pub load_report: LoadReport,
}

impl Project {
    /// Load config and commands under `root`.
    ///
    /// Both files are optional; a missing file yields its defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let paths = PilotPaths::new(root);
        let config = load_config(&paths.config_path)?;
        let commands_path = paths.commands_path(&config);
        let (registry, load_report) = load_registry(&commands_path)
            .with_context(|| format!("load commands from {}", commands_path.display()))?;
        debug!(
            commands = registry.len(),
            stubs = load_report.stubs.len(),
            "project loaded"
        );
        Ok(Self {
            paths,
            config,
            commands_path,
            registry,
            load_report,
        })
    }

    /// Persist the in-memory registry to the configured command file.
    pub fn save_commands(&self) -> Result<()> {
        save_commands(&self.commands_path, &self.registry)
    }

    /// Shell-backed executor over this project's commands.
    ///
    /// Consumes the project's registry; mutations through the returned handle
    /// are not saved.
    pub fn into_executor(self) -> (PilotConfig, CommandExecutor) {
        let runner = ShellRunner::new(
            self.config.executor.timeout(),
            self.config.executor.output_limit_bytes,
        );
        let handle: RegistryHandle = registry::shared(self.registry);
        (self.config, CommandExecutor::new(handle, Arc::new(runner)))
    }
}
