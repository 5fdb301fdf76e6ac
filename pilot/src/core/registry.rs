//! Named command descriptors available to the executor.
//!
//! The registry is owned by the hosting application and shared by handle
//! (`RegistryHandle`). Consumers only read it; the host mutates it outside of
//! any execution in progress.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// In-process implementation of a native command.
pub type NativeHandler = Arc<dyn Fn(&[String]) -> anyhow::Result<String> + Send + Sync>;

/// Shared, host-owned registry.
pub type RegistryHandle = Arc<RwLock<CommandRegistry>>;

pub fn shared(registry: CommandRegistry) -> RegistryHandle {
    Arc::new(RwLock::new(registry))
}

/// Read access that survives a poisoned lock; the registry holds no invariants
/// a panicking writer could break halfway.
pub fn read(handle: &RegistryHandle) -> RwLockReadGuard<'_, CommandRegistry> {
    handle.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write(handle: &RegistryHandle) -> RwLockWriteGuard<'_, CommandRegistry> {
    handle.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    Native,
    OsTemplate,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Native => "native",
            CommandKind::OsTemplate => "os-template",
        }
    }
}

#[derive(Clone)]
pub enum Implementation {
    /// `None` marks a stub loaded from configuration without a registered handler.
    Native(Option<NativeHandler>),
    OsTemplate(String),
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::Native(Some(_)) => f.write_str("Native(<handler>)"),
            Implementation::Native(None) => f.write_str("Native(<stub>)"),
            Implementation::OsTemplate(template) => {
                f.debug_tuple("OsTemplate").field(template).finish()
            }
        }
    }
}

/// Behaviour-neutral fields shared by every descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFlags {
    pub enabled: bool,
    pub requires_elevated_privilege: bool,
    /// Argument tokens that request help text instead of execution.
    pub help_arguments: Vec<String>,
}

impl Default for CommandFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            requires_elevated_privilege: false,
            help_arguments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub flags: CommandFlags,
    pub implementation: Implementation,
}

impl CommandDescriptor {
    pub fn kind(&self) -> CommandKind {
        match self.implementation {
            Implementation::Native(_) => CommandKind::Native,
            Implementation::OsTemplate(_) => CommandKind::OsTemplate,
        }
    }

    pub fn template(&self) -> Option<&str> {
        match &self.implementation {
            Implementation::OsTemplate(template) => Some(template),
            Implementation::Native(_) => None,
        }
    }

    /// True for native commands with a registered in-process handler.
    pub fn has_native_handler(&self) -> bool {
        matches!(self.implementation, Implementation::Native(Some(_)))
    }

    pub fn is_help_request(&self, args: &[String]) -> bool {
        args.iter()
            .any(|arg| self.flags.help_arguments.iter().any(|help| help == arg))
    }

    /// Human-readable summary of the descriptor.
    pub fn help(&self) -> String {
        let mut buf = format!("Command: {}", self.name);
        if !self.flags.enabled {
            buf.push_str(" (DISABLED)");
        }
        buf.push('\n');
        buf.push_str(&format!("  Description: {}\n", self.description));
        buf.push_str(&format!("  Type: {}\n", self.kind().as_str()));
        match &self.implementation {
            Implementation::OsTemplate(template) => {
                buf.push_str(&format!("  Template: {template}\n"));
            }
            Implementation::Native(None) => {
                buf.push_str("  Handler: not registered in this process\n");
            }
            Implementation::Native(Some(_)) => {}
        }
        if self.flags.requires_elevated_privilege {
            buf.push_str("  Requires elevated privilege: yes\n");
        }
        if !self.flags.help_arguments.is_empty() {
            buf.push_str(&format!(
                "  Help arguments: {}\n",
                self.flags.help_arguments.join(" ")
            ));
        }
        buf
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command '{0}' already exists")]
    AlreadyExists(String),
    #[error("command '{0}' not found")]
    NotFound(String),
}

/// What an upsert did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// A native entry kept its behaviour; only its flags and description changed.
    NativePreserved,
}

#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process command. Fails if the name is taken.
    pub fn register_native(
        &mut self,
        name: &str,
        description: &str,
        handler: NativeHandler,
        flags: CommandFlags,
    ) -> Result<(), RegistryError> {
        if self.commands.contains_key(name) {
            return Err(RegistryError::AlreadyExists(name.to_string()));
        }
        debug!(name, "registering native command");
        self.commands.insert(
            name.to_string(),
            CommandDescriptor {
                name: name.to_string(),
                description: description.to_string(),
                flags,
                implementation: Implementation::Native(Some(handler)),
            },
        );
        Ok(())
    }

    /// Add or update an OS-template command.
    ///
    /// A native command of the same name, stub or not, keeps its behaviour;
    /// only description and flags are updated.
    pub fn upsert_template(
        &mut self,
        name: &str,
        description: &str,
        template: &str,
        flags: CommandFlags,
    ) -> UpsertOutcome {
        if let Some(existing) = self.commands.get_mut(name) {
            if existing.kind() == CommandKind::Native {
                warn!(name, "native command keeps its behaviour; template ignored");
                existing.description = description.to_string();
                existing.flags = flags;
                return UpsertOutcome::NativePreserved;
            }
            existing.description = description.to_string();
            existing.flags = flags;
            existing.implementation = Implementation::OsTemplate(template.to_string());
            return UpsertOutcome::Replaced;
        }
        self.commands.insert(
            name.to_string(),
            CommandDescriptor {
                name: name.to_string(),
                description: description.to_string(),
                flags,
                implementation: Implementation::OsTemplate(template.to_string()),
            },
        );
        UpsertOutcome::Inserted
    }

    /// Record a native command known only by name (no handler in this process).
    ///
    /// A registered handler of the same name is kept and only its flags and
    /// description are updated.
    pub fn upsert_native_stub(
        &mut self,
        name: &str,
        description: &str,
        flags: CommandFlags,
    ) -> UpsertOutcome {
        if let Some(existing) = self.commands.get_mut(name) {
            existing.description = description.to_string();
            existing.flags = flags;
            if existing.has_native_handler() {
                return UpsertOutcome::NativePreserved;
            }
            existing.implementation = Implementation::Native(None);
            return UpsertOutcome::Replaced;
        }
        self.commands.insert(
            name.to_string(),
            CommandDescriptor {
                name: name.to_string(),
                description: description.to_string(),
                flags,
                implementation: Implementation::Native(None),
            },
        );
        UpsertOutcome::Inserted
    }

    pub fn unregister(&mut self, name: &str) -> Result<CommandDescriptor, RegistryError> {
        self.commands
            .remove(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let descriptor = self
            .commands
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        descriptor.flags.enabled = enabled;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    /// Descriptors sorted by name.
    pub fn list(&self, include_disabled: bool) -> Vec<&CommandDescriptor> {
        self.commands
            .values()
            .filter(|descriptor| include_disabled || descriptor.flags.enabled)
            .collect()
    }

    pub fn help(&self, name: &str) -> Option<String> {
        self.get(name).map(CommandDescriptor::help)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_handler() -> NativeHandler {
        Arc::new(|args: &[String]| Ok(args.join(" ")))
    }

    #[test]
    fn register_native_rejects_duplicates() {
        let mut registry = CommandRegistry::new();
        registry
            .register_native("echo", "prints", echo_handler(), CommandFlags::default())
            .expect("first");
        let err = registry
            .register_native("echo", "again", echo_handler(), CommandFlags::default())
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyExists("echo".to_string()));
    }

    #[test]
    fn template_upsert_preserves_native_handler() {
        let mut registry = CommandRegistry::new();
        registry
            .register_native("echo", "prints", echo_handler(), CommandFlags::default())
            .expect("register");

        let outcome = registry.upsert_template(
            "echo",
            "new description",
            "echo %ARGS_ALL%",
            CommandFlags {
                enabled: false,
                requires_elevated_privilege: true,
                help_arguments: vec!["--help".to_string()],
            },
        );

        assert_eq!(outcome, UpsertOutcome::NativePreserved);
        let echo = registry.get("echo").expect("echo");
        assert!(echo.has_native_handler());
        assert_eq!(echo.kind(), CommandKind::Native);
        assert_eq!(echo.description, "new description");
        assert!(!echo.flags.enabled);
        assert!(echo.flags.requires_elevated_privilege);
    }

    #[test]
    fn template_upsert_keeps_native_stub() {
        let mut registry = CommandRegistry::new();
        registry.upsert_native_stub("deploy", "ships it", CommandFlags::default());

        let outcome = registry.upsert_template(
            "deploy",
            "now a template",
            "rm -rf %ARGS_ALL%",
            CommandFlags::default(),
        );

        assert_eq!(outcome, UpsertOutcome::NativePreserved);
        let deploy = registry.get("deploy").expect("deploy");
        assert_eq!(deploy.kind(), CommandKind::Native);
        assert_eq!(deploy.template(), None);
        assert_eq!(deploy.description, "now a template");
    }

    #[test]
    fn template_upsert_replaces_template() {
        let mut registry = CommandRegistry::new();
        assert_eq!(
            registry.upsert_template("py", "python", "python %ARGS_ALL%", CommandFlags::default()),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            registry.upsert_template("py", "python3", "python3 %ARGS_ALL%", CommandFlags::default()),
            UpsertOutcome::Replaced
        );
        assert_eq!(
            registry.get("py").and_then(CommandDescriptor::template),
            Some("python3 %ARGS_ALL%")
        );
    }

    #[test]
    fn stub_does_not_override_handler() {
        let mut registry = CommandRegistry::new();
        registry
            .register_native("echo", "prints", echo_handler(), CommandFlags::default())
            .expect("register");
        assert_eq!(
            registry.upsert_native_stub("echo", "from config", CommandFlags::default()),
            UpsertOutcome::NativePreserved
        );
        assert!(registry.get("echo").expect("echo").has_native_handler());

        assert_eq!(
            registry.upsert_native_stub("ghost", "no handler", CommandFlags::default()),
            UpsertOutcome::Inserted
        );
        let ghost = registry.get("ghost").expect("ghost");
        assert_eq!(ghost.kind(), CommandKind::Native);
        assert!(!ghost.has_native_handler());
    }

    #[test]
    fn enable_disable_and_list() {
        let mut registry = CommandRegistry::new();
        registry.upsert_template("b", "b", "b", CommandFlags::default());
        registry.upsert_template("a", "a", "a", CommandFlags::default());
        registry.set_enabled("b", false).expect("disable");

        let enabled: Vec<&str> = registry.list(false).iter().map(|d| d.name.as_str()).collect();
        assert_eq!(enabled, vec!["a"]);
        let all: Vec<&str> = registry.list(true).iter().map(|d| d.name.as_str()).collect();
        assert_eq!(all, vec!["a", "b"]);

        assert_eq!(
            registry.set_enabled("missing", true),
            Err(RegistryError::NotFound("missing".to_string()))
        );
    }

    #[test]
    fn unregister_removes_entry() {
        let mut registry = CommandRegistry::new();
        registry.upsert_template("ls", "list", "ls %ARGS_ALL%", CommandFlags::default());
        assert!(registry.unregister("ls").is_ok());
        assert!(registry.get("ls").is_none());
        assert!(registry.unregister("ls").is_err());
    }

    #[test]
    fn help_mentions_template_and_disabled() {
        let mut registry = CommandRegistry::new();
        registry.upsert_template(
            "gcc",
            "GNU C Compiler.",
            "gcc %ARGS_ALL%",
            CommandFlags {
                enabled: false,
                ..CommandFlags::default()
            },
        );
        let help = registry.help("gcc").expect("help");
        assert!(help.contains("(DISABLED)"));
        assert!(help.contains("gcc %ARGS_ALL%"));
        assert!(registry.help("nope").is_none());
    }
}
