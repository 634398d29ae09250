//! File storage, migration and log parsing helpers.

pub mod history;
pub mod log_parser;
pub mod migration;
