//! Subcommand handlers.

pub mod dump;
pub mod serve;
