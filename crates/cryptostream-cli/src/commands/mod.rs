//! CLI command implementations.
//!
//! Each module exports an `*Args` struct for `clap` and a `run` function.

pub mod check;
pub mod extract;
pub mod platform;

/// Output format shared by the reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable listing.
    Table,
    /// Pretty-printed JSON.
    Json,
}
