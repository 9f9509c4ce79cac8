//! Diagnostics for the cryptostream native library loader.
//!
//! Usage:
//! ```bash
//! cryptostream check               # Load the native library and report
//! cryptostream check --strict      # Fail when it is unavailable
//! cryptostream platform            # Show the platform mapping
//! cryptostream extract --out dir   # Extract the bundled library
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "cryptostream", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the native library and report the outcome
    Check(commands::check::CheckArgs),

    /// Show how this host maps to a bundled library
    Platform(commands::platform::PlatformArgs),

    /// Extract the bundled library without loading it
    Extract(commands::extract::ExtractArgs),
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Check(_) => f.debug_tuple("Check").finish(),
            Self::Platform(_) => f.debug_tuple("Platform").finish(),
            Self::Extract(_) => f.debug_tuple("Extract").finish(),
        }
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().context("failed to parse log directive")?),
        )
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "Running command");

    match &cli.command {
        Command::Check(args) => commands::check::run(args),
        Command::Platform(args) => commands::platform::run(args).map(|()| ExitCode::SUCCESS),
        Command::Extract(args) => commands::extract::run(args).map(|()| ExitCode::SUCCESS),
    }
}
