//! Human-approved task orchestration CLI.
//!
//! Reads `.pilot/config.toml` and `.pilot/commands.json` from the current
//! directory. `pilot run` walks the given tasks with a local text generator
//! and asks before running any suggested command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use pilot::core::registry::CommandDescriptor;
use pilot::exit_codes;
use pilot::io::generator::{ProgramGenerator, TextGenerator};
use pilot::io::init::{InitOptions, init_pilot};
use pilot::io::operator::TerminalOperator;
use pilot::logging;
use pilot::orchestrator::Orchestrator;
use pilot::project::Project;
use pilot::session::{parse_task_list, run_session};
use pilot::validate::validate_pilot;

#[derive(Parser)]
#[command(
    name = "pilot",
    version,
    about = "Human-approved task orchestration with a local text generator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.pilot/config.toml` and `.pilot/commands.json` with defaults.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the given tasks in order, asking before every command.
    Run {
        /// A task to run; repeat for several.
        #[arg(short, long = "task", value_name = "TEXT")]
        tasks: Vec<String>,
        /// File with one task per line (`#` starts a comment).
        #[arg(long, value_name = "PATH")]
        tasks_file: Option<PathBuf>,
    },
    /// Execute a command line directly, without approval.
    Exec {
        /// Command line, e.g. `mkdir reports`.
        line: String,
    },
    /// Inspect or change the command registry.
    Commands {
        #[command(subcommand)]
        action: CommandsAction,
    },
    /// Check config and command file.
    Validate,
}

#[derive(Subcommand)]
enum CommandsAction {
    /// List registered commands.
    List {
        /// Include disabled commands.
        #[arg(short, long)]
        all: bool,
    },
    /// Show one command's help text.
    Show { name: String },
    /// Enable a command.
    Enable { name: String },
    /// Disable a command.
    Disable { name: String },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = Path::new(".");
    match cli.command {
        Command::Init { force } => cmd_init(root, force),
        Command::Run { tasks, tasks_file } => cmd_run(root, tasks, tasks_file.as_deref()),
        Command::Exec { line } => cmd_exec(root, &line),
        Command::Commands { action } => cmd_commands(root, action),
        Command::Validate => cmd_validate(root),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_pilot(root, &InitOptions { force })?;
    println!("initialized {}", paths.pilot_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_run(root: &Path, mut tasks: Vec<String>, tasks_file: Option<&Path>) -> Result<i32> {
    if let Some(path) = tasks_file {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        tasks.extend(parse_task_list(&contents));
    }
    if tasks.is_empty() {
        bail!("no tasks given (use --task or --tasks-file)");
    }

    let project = Project::load(root)?;
    let generator: Arc<dyn TextGenerator> =
        Arc::new(ProgramGenerator::from_config(&project.config.generator));
    let (config, executor) = project.into_executor();

    let runtime = tokio::runtime::Runtime::new().context("start async runtime")?;
    let outcome = runtime.block_on(async {
        let (orchestrator, mut events) =
            Orchestrator::spawn(Some(generator), executor.registry().clone(), &config)?;
        let mut operator = TerminalOperator::stdio();
        run_session(&orchestrator, &mut events, &executor, &mut operator, tasks).await
    })?;

    if outcome.success {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::RUN_UNSUCCESSFUL)
    }
}

fn cmd_exec(root: &Path, line: &str) -> Result<i32> {
    let (_config, executor) = Project::load(root)?.into_executor();
    let result = executor.execute(line);
    if !result.output.is_empty() {
        println!("{}", result.output.trim_end());
    }
    if result.is_success() {
        return Ok(exit_codes::OK);
    }
    eprintln!("{}", result.error);
    Ok(exit_codes::COMMAND_FAILED)
}

fn cmd_commands(root: &Path, action: CommandsAction) -> Result<i32> {
    let mut project = Project::load(root)?;
    match action {
        CommandsAction::List { all } => {
            for descriptor in project.registry.list(all) {
                println!("{}", list_line(descriptor));
            }
        }
        CommandsAction::Show { name } => {
            let help = project
                .registry
                .help(&name)
                .with_context(|| format!("unknown command '{name}'"))?;
            println!("{help}");
        }
        CommandsAction::Enable { name } => {
            project.registry.set_enabled(&name, true)?;
            project.save_commands()?;
            println!("enabled {name}");
        }
        CommandsAction::Disable { name } => {
            project.registry.set_enabled(&name, false)?;
            project.save_commands()?;
            println!("disabled {name}");
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path) -> Result<i32> {
    let outcome = validate_pilot(root)?;
    println!(
        "ok: {} commands ({} enabled)",
        outcome.commands, outcome.enabled
    );
    for name in &outcome.stubs {
        println!("note: native command '{name}' has no handler in this build");
    }
    if !outcome.generator_configured {
        println!("note: [generator].program is empty; `pilot run` will not start");
    }
    Ok(exit_codes::OK)
}

fn list_line(descriptor: &CommandDescriptor) -> String {
    let mut markers = Vec::new();
    if !descriptor.flags.enabled {
        markers.push("disabled");
    }
    if descriptor.flags.requires_elevated_privilege {
        markers.push("elevated");
    }
    let markers = if markers.is_empty() {
        String::new()
    } else {
        format!(" [{}]", markers.join(", "))
    };
    format!(
        "{:<12} {:<12} {}{}",
        descriptor.name,
        descriptor.kind().as_str(),
        descriptor.description,
        markers
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["pilot", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["pilot", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_repeated_tasks() {
        let cli = Cli::parse_from([
            "pilot",
            "run",
            "--task",
            "create directory reports",
            "-t",
            "compile main.c",
        ]);
        match cli.command {
            Command::Run { tasks, tasks_file } => {
                assert_eq!(tasks, vec!["create directory reports", "compile main.c"]);
                assert!(tasks_file.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_exec_takes_whole_line() {
        let cli = Cli::parse_from(["pilot", "exec", "mkdir \"my dir\""]);
        assert!(matches!(cli.command, Command::Exec { line } if line == "mkdir \"my dir\""));
    }

    #[test]
    fn parse_commands_list_all() {
        let cli = Cli::parse_from(["pilot", "commands", "list", "--all"]);
        assert!(matches!(
            cli.command,
            Command::Commands {
                action: CommandsAction::List { all: true }
            }
        ));
    }

    #[test]
    fn exec_reports_unknown_command_as_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let code = cmd_exec(temp.path(), "frobnicate now").expect("exec");
        assert_eq!(code, exit_codes::COMMAND_FAILED);
    }

    #[test]
    fn disable_persists_to_command_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_pilot(temp.path(), &InitOptions { force: false }).expect("init");
        cmd_commands(
            temp.path(),
            CommandsAction::Disable {
                name: "gcc".to_string(),
            },
        )
        .expect("disable");
        let project = Project::load(temp.path()).expect("load");
        assert!(!project.registry.get("gcc").expect("gcc").flags.enabled);
    }

    #[test]
    fn run_without_tasks_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = cmd_run(temp.path(), Vec::new(), None).expect_err("no tasks");
        assert!(err.to_string().contains("no tasks"));
    }
}
