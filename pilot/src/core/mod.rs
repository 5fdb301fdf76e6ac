//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod builtins;
pub mod command_line;
pub mod completion;
pub mod interpreter;
pub mod registry;
pub mod step_context;
pub mod template;
pub mod text;
pub mod types;
