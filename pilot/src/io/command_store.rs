//! Persisted command configuration (`.pilot/commands.json`).
//!
//! Only behaviour-neutral fields are stored. Native records name a command
//! whose handler must be registered in-process; when none is, the record
//! loads as a stub that is listed but cannot run.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::builtins::{default_registry, native_registry};
use crate::core::registry::{CommandFlags, CommandKind, CommandRegistry, UpsertOutcome};
use crate::io::config::write_atomic;

pub const COMMANDS_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/commands/v1.schema.json"
));

pub const COMMANDS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFile {
    pub version: u32,
    pub commands: Vec<CommandRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub name: String,
    pub description: String,
    pub is_enabled: bool,
    pub requires_elevated_privilege: bool,
    pub kind: CommandKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub help_arguments: Vec<String>,
}

impl CommandRecord {
    fn flags(&self) -> CommandFlags {
        CommandFlags {
            enabled: self.is_enabled,
            requires_elevated_privilege: self.requires_elevated_privilege,
            help_arguments: self.help_arguments.clone(),
        }
    }
}

/// What applying a command file changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: Vec<String>,
    pub replaced: Vec<String>,
    /// Native commands that kept their in-process handler.
    pub native_preserved: Vec<String>,
    /// Native records with no in-process handler.
    pub stubs: Vec<String>,
}

/// Snapshot the registry as persistable records, sorted by name.
pub fn records(registry: &CommandRegistry) -> Vec<CommandRecord> {
    registry
        .list(true)
        .into_iter()
        .map(|descriptor| CommandRecord {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            is_enabled: descriptor.flags.enabled,
            requires_elevated_privilege: descriptor.flags.requires_elevated_privilege,
            kind: descriptor.kind(),
            template: descriptor.template().map(str::to_string),
            help_arguments: descriptor.flags.help_arguments.clone(),
        })
        .collect()
}

/// Merge persisted records into `registry`.
pub fn apply_records(registry: &mut CommandRegistry, records: &[CommandRecord]) -> LoadReport {
    let mut report = LoadReport::default();
    for record in records {
        let outcome = match record.kind {
            CommandKind::OsTemplate => registry.upsert_template(
                &record.name,
                &record.description,
                record.template.as_deref().unwrap_or_default(),
                record.flags(),
            ),
            CommandKind::Native => {
                registry.upsert_native_stub(&record.name, &record.description, record.flags())
            }
        };
        let name = record.name.clone();
        match outcome {
            UpsertOutcome::NativePreserved => report.native_preserved.push(name),
            UpsertOutcome::Inserted | UpsertOutcome::Replaced
                if record.kind == CommandKind::Native =>
            {
                warn!(name = %record.name, "native command has no handler; loaded as stub");
                report.stubs.push(name);
            }
            UpsertOutcome::Inserted => report.inserted.push(name),
            UpsertOutcome::Replaced => report.replaced.push(name),
        }
    }
    report
}

/// Validate a command document against the bundled schema (Draft 2020-12).
pub fn validate_command_document(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(COMMANDS_SCHEMA).context("parse commands schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile commands schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!(
            "command file schema validation failed:\n- {}",
            messages.join("\n- ")
        );
    }
    Ok(())
}

/// Read and validate a command file. A missing file yields `None`.
pub fn read_command_file(path: &Path) -> Result<Option<CommandFile>> {
    if !path.exists() {
        debug!(path = %path.display(), "no command file");
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    validate_command_document(&value).with_context(|| format!("validate {}", path.display()))?;
    let file: CommandFile = serde_json::from_value(value)
        .with_context(|| format!("deserialize {}", path.display()))?;
    let mut seen = BTreeSet::new();
    for record in &file.commands {
        if !seen.insert(record.name.as_str()) {
            bail!("duplicate command '{}' in {}", record.name, path.display());
        }
    }
    Ok(Some(file))
}

/// Load `path` into `registry`. A missing file leaves the registry untouched.
pub fn load_commands(path: &Path, registry: &mut CommandRegistry) -> Result<LoadReport> {
    let Some(file) = read_command_file(path)? else {
        return Ok(LoadReport::default());
    };
    let report = apply_records(registry, &file.commands);
    info!(
        path = %path.display(),
        commands = file.commands.len(),
        stubs = report.stubs.len(),
        "loaded command configuration"
    );
    Ok(report)
}

/// Build the registry a process starts with.
///
/// Without a command file this is the default command set. With one, the file
/// is authoritative: only in-process handlers the file names are kept, every
/// record is applied on top, so removed or disabled defaults stay that way.
pub fn load_registry(path: &Path) -> Result<(CommandRegistry, LoadReport)> {
    let Some(file) = read_command_file(path)? else {
        return Ok((default_registry(), LoadReport::default()));
    };
    let mut registry = native_registry();
    let listed: BTreeSet<&str> = file.commands.iter().map(|r| r.name.as_str()).collect();
    let unlisted: Vec<String> = registry
        .list(true)
        .into_iter()
        .map(|descriptor| descriptor.name.clone())
        .filter(|name| !listed.contains(name.as_str()))
        .collect();
    for name in unlisted {
        debug!(%name, "native command not in command file; dropped");
        registry.unregister(&name)?;
    }
    let report = apply_records(&mut registry, &file.commands);
    Ok((registry, report))
}

/// Atomically write the registry's records to `path`.
pub fn save_commands(path: &Path, registry: &CommandRegistry) -> Result<()> {
    let file = CommandFile {
        version: COMMANDS_VERSION,
        commands: records(registry),
    };
    let mut buf = serde_json::to_string_pretty(&file).context("serialize command file")?;
    buf.push('\n');
    write_atomic(path, &buf)?;
    debug!(path = %path.display(), commands = file.commands.len(), "saved command configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("commands.json");
        let mut registry = default_registry();
        registry.set_enabled("gcc", false).expect("disable");
        save_commands(&path, &registry).expect("save");

        let mut loaded = default_registry();
        loaded.set_enabled("gcc", true).expect("enable");
        let report = load_commands(&path, &mut loaded).expect("load");

        assert_eq!(records(&loaded), records(&registry));
        assert_eq!(report.native_preserved, vec!["echo".to_string()]);
        assert!(report.stubs.is_empty());
        assert!(loaded.get("echo").expect("echo").has_native_handler());
    }

    #[test]
    fn native_record_without_handler_loads_as_stub() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("commands.json");
        fs::write(
            &path,
            r#"{"version":1,"commands":[
                {"name":"deploy","description":"in-house","isEnabled":true,
                 "requiresElevatedPrivilege":true,"kind":"native"}
            ]}"#,
        )
        .expect("write");

        let mut registry = CommandRegistry::new();
        let report = load_commands(&path, &mut registry).expect("load");

        assert_eq!(report.stubs, vec!["deploy".to_string()]);
        let deploy = registry.get("deploy").expect("deploy");
        assert!(!deploy.has_native_handler());
        assert!(deploy.flags.requires_elevated_privilege);
    }

    #[test]
    fn schema_violations_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("commands.json");

        // os-template without a template
        fs::write(
            &path,
            r#"{"version":1,"commands":[
                {"name":"ls","description":"","isEnabled":true,
                 "requiresElevatedPrivilege":false,"kind":"os-template"}
            ]}"#,
        )
        .expect("write");
        let err = load_commands(&path, &mut CommandRegistry::new()).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));

        fs::write(&path, r#"{"version":2,"commands":[]}"#).expect("write");
        assert!(load_commands(&path, &mut CommandRegistry::new()).is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("commands.json");
        let record = r#"{"name":"ls","description":"","isEnabled":true,
            "requiresElevatedPrivilege":false,"kind":"os-template","template":"ls"}"#;
        fs::write(
            &path,
            format!(r#"{{"version":1,"commands":[{record},{record}]}}"#),
        )
        .expect("write");
        let err = load_commands(&path, &mut CommandRegistry::new()).unwrap_err();
        assert!(err.to_string().contains("duplicate command 'ls'"));
    }

    #[test]
    fn missing_file_changes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut registry = default_registry();
        let report = load_commands(&temp.path().join("absent.json"), &mut registry).expect("load");
        assert_eq!(report, LoadReport::default());
        assert_eq!(registry.len(), default_registry().len());
    }

    #[test]
    fn command_file_is_authoritative_over_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("commands.json");

        let (registry, _) = load_registry(&path).expect("defaults");
        assert!(registry.get("gcc").is_some());

        let mut trimmed = default_registry();
        trimmed.unregister("gcc").expect("unregister");
        trimmed.set_enabled("echo", false).expect("disable");
        save_commands(&path, &trimmed).expect("save");

        let (registry, report) = load_registry(&path).expect("load");
        assert!(registry.get("gcc").is_none());
        let echo = registry.get("echo").expect("echo");
        assert!(echo.has_native_handler());
        assert!(!echo.flags.enabled);
        assert_eq!(report.native_preserved, vec!["echo".to_string()]);
    }

    #[test]
    fn native_command_removed_from_file_stays_removed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("commands.json");
        fs::write(&path, r#"{"version": 1, "commands": []}"#).expect("write");

        let (registry, report) = load_registry(&path).expect("load");
        assert!(registry.is_empty());
        assert_eq!(report, LoadReport::default());
    }

    #[test]
    fn records_use_camel_case_fields() {
        let json = serde_json::to_value(records(&default_registry())).expect("serialize");
        let first = &json[0];
        assert!(first.get("isEnabled").is_some());
        assert!(first.get("requiresElevatedPrivilege").is_some());
        validate_command_document(&serde_json::json!({"version": 1, "commands": json}))
            .expect("valid");
    }
}
