//! Data structures shared between the store and the CLI.

pub mod record;
pub mod report;
