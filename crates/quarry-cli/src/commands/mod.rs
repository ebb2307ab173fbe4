//! Subcommand implementations.

pub mod clear;
pub mod index;
pub mod lines;
pub mod query;
pub mod status;
pub mod watch;
