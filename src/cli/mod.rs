//! CLI layer for insight-rs.
//!
//! Provides the command-line interface using clap, with commands for
//! initializing the database, asking questions, and managing user memory.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, HoldingCommands, ProfileCommands, QueryArgs};
