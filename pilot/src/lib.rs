//! Human-approved task orchestration.
//!
//! An orchestrator walks an ordered list of tasks, asks a text-generation
//! capability how to proceed on each one and interprets the reply as a
//! suggested local command, a question for the operator, or a completion
//! signal. Suggested commands only run after the operator approves them.
//!
//! - **[`core`]**: Pure, deterministic logic (command lines, templates, reply
//!   interpretation, completion policy, the command registry).
//! - **[`io`]**: Side effects (config, command persistence, processes,
//!   text generation, prompts, the terminal operator).
//! - **[`orchestrator`]**: The state machine and the actor that serializes it.
//! - **[`session`]**: Drives one run end to end against an operator.
//! - **[`project`]**, **[`validate`]**: `.pilot/` loading and checks for the CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod project;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
