//! Extracts the bundled native library for this host without loading it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use cryptostream::{ExtractedArtifact, NativeLoader};

#[derive(Args)]
pub struct ExtractArgs {
    /// Directory to write the library into; created if missing.
    #[arg(short, long)]
    pub out: PathBuf,
}

pub fn run(args: &ExtractArgs) -> Result<()> {
    let artifact = extract_to(cryptostream::native_loader(), &args.out)?;

    println!(
        "{} Extracted {} {}",
        style("✓").green(),
        style(artifact.file_path.display()).bold(),
        style(format!("(version {})", artifact.version)).dim()
    );
    Ok(())
}

fn extract_to(loader: &NativeLoader, out: &Path) -> Result<ExtractedArtifact> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("failed to create output directory: {}", out.display()))?;
    let out = std::path::absolute(out)
        .with_context(|| format!("failed to resolve output directory: {}", out.display()))?;

    tracing::debug!(out = %out.display(), "Extracting bundled native library");
    loader
        .extract_bundled(&out)
        .with_context(|| format!("failed to extract native library into {}", out.display()))
}
