//! CLI subcommand implementations for the blobtap binary.

pub mod capture_cmd;
pub mod repl;
