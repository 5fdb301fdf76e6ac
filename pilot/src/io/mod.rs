//! I/O for the orchestrator: configuration, persistence, processes, prompts
//! and the two external parties (text generator and operator).

pub mod command_store;
pub mod config;
pub mod executor;
pub mod generator;
pub mod init;
pub mod operator;
pub mod process;
pub mod prompt;
