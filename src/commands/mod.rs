//! Command handlers behind the CLI.

pub mod history;
pub mod ingest;
pub mod usage;
