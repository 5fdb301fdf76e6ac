//! The command set a fresh registry starts with.

use std::sync::Arc;

use crate::core::registry::{CommandFlags, CommandRegistry, NativeHandler};

fn help_flags() -> CommandFlags {
    CommandFlags {
        help_arguments: vec!["--help".to_string()],
        ..CommandFlags::default()
    }
}

fn echo_handler() -> NativeHandler {
    Arc::new(|args: &[String]| Ok(args.join(" ")))
}

#[cfg(windows)]
const MKDIR_TEMPLATE: &str = "mkdir %ARG[0]%";
#[cfg(not(windows))]
const MKDIR_TEMPLATE: &str = "mkdir -p %ARG[0]%";

#[cfg(windows)]
const LIST_TEMPLATE: &str = "dir %ARGS_ALL%";
#[cfg(not(windows))]
const LIST_TEMPLATE: &str = "ls %ARGS_ALL%";

/// Registry holding only the commands implemented in-process.
pub fn native_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    if let Err(err) = registry.register_native(
        "echo",
        "Prints its arguments joined by single spaces.",
        echo_handler(),
        help_flags(),
    ) {
        tracing::error!(err = %err, "native command table is inconsistent");
    }
    registry
}

/// Native commands plus the stock OS-template commands.
pub fn default_registry() -> CommandRegistry {
    let mut registry = native_registry();
    let templates: [(&str, &str, &str); 5] = [
        ("mkdir", "Creates a directory.", MKDIR_TEMPLATE),
        ("ls", "Lists directory contents.", LIST_TEMPLATE),
        ("python", "Runs the Python interpreter.", "python %ARGS_ALL%"),
        ("gcc", "GNU C compiler.", "gcc %ARGS_ALL%"),
        ("g++", "GNU C++ compiler.", "g++ %ARGS_ALL%"),
    ];
    for (name, description, template) in templates {
        let flags = if name == "mkdir" {
            help_flags()
        } else {
            CommandFlags::default()
        };
        registry.upsert_template(name, description, template, flags);
    }
    registry
}
