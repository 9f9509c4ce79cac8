//! Reports whether the native library loads in this process.

use std::{
    fmt::{self, Write as _},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use cryptostream::{
    Config, LoadReport, LoadStatus,
    cipher::{self, CipherSuite},
};

use super::OutputFormat;

#[derive(Args)]
pub struct CheckArgs {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Exit with a failure status when the native library is unavailable.
    #[arg(long)]
    pub strict: bool,
}

/// Crypto settings the native library will be used with.
struct CryptoSettings {
    suite: CipherSuite,
    buffer_size: usize,
}

impl CryptoSettings {
    fn from_config(config: &Config) -> Result<Self> {
        let suite = config
            .cipher_suite()
            .context("invalid cipher suite configuration")?;
        cipher::check_codec(suite).context("unsupported cipher suite")?;
        let buffer_size = config
            .buffer_size()
            .context("invalid buffer size configuration")?;
        let buffer_size =
            cipher::check_buffer_size(suite, buffer_size).context("unsupported buffer size")?;
        Ok(Self { suite, buffer_size })
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cipherSuite": self.suite.name(),
            "bufferSize": self.buffer_size,
        })
    }
}

pub fn run(args: &CheckArgs) -> Result<ExitCode> {
    let loader = cryptostream::native_loader();
    let report = loader.ensure_loaded();
    let settings = CryptoSettings::from_config(loader.config());

    match args.format {
        OutputFormat::Json => {
            let crypto = match &settings {
                Ok(settings) => settings.to_json(),
                Err(e) => serde_json::json!({ "error": format!("{e:#}") }),
            };
            let output = serde_json::json!({
                "native": report,
                "crypto": crypto,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("failed to serialize load report")?
            );
        }
        OutputFormat::Table => print!(
            "{}",
            render_table(report, &settings).context("failed to render load report")?
        ),
    }

    if args.strict && !(report.is_loaded() && settings.is_ok()) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn render_table(
    report: &LoadReport,
    settings: &Result<CryptoSettings>,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let status = match report.status {
        LoadStatus::Loaded => style("loaded").green().bold(),
        LoadStatus::Unavailable => style("unavailable").yellow().bold(),
        LoadStatus::NotAttempted | LoadStatus::Attempting => style("pending").dim(),
    };

    writeln!(out, "{}", style("Native Library").bold().underlined())?;
    writeln!(out)?;
    writeln!(out, "{}: {status}", style("Status").cyan())?;
    writeln!(
        out,
        "{}: {}",
        style("Platform").cyan(),
        report.platform.lib_folder_path
    )?;
    writeln!(out, "{}: {}", style("Library").cyan(), report.library.resolved_name)?;
    if let (Some(strategy), Some(path)) = (report.strategy, &report.loaded_from) {
        writeln!(out, "{}: {strategy}", style("Strategy").cyan())?;
        writeln!(out, "{}: {}", style("Path").cyan(), path.display())?;
    }
    if let Some(artifact) = &report.artifact {
        writeln!(out, "{}: {}", style("Version").cyan(), artifact.version)?;
    }
    match settings {
        Ok(settings) => {
            writeln!(out, "{}: {}", style("Cipher suite").cyan(), settings.suite)?;
            writeln!(out, "{}: {}", style("Buffer size").cyan(), settings.buffer_size)?;
        }
        Err(e) => writeln!(out, "{}: {} {e:#}", style("Crypto").cyan(), style("✗").red())?,
    }

    if !report.failures.is_empty() {
        writeln!(out)?;
        writeln!(out, "{:<20} {}", style("STRATEGY").bold(), style("ERROR").bold())?;
        writeln!(out, "{}", "-".repeat(80))?;
        for failure in &report.failures {
            writeln!(out, "{:<20} {}", failure.strategy.to_string(), failure.error)?;
        }
    }

    writeln!(out)?;
    if report.is_loaded() {
        writeln!(out, "{} native library in use", style("✓").green())?;
    } else {
        writeln!(out, "{} using builtin implementations", style("!").yellow())?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use cryptostream::{
        NativeLoader, config::keys, platform::FixedOsInfo, resource::StaticResources,
    };

    use super::*;

    fn unavailable_report() -> LoadReport {
        NativeLoader::builder()
            .config(Config::empty())
            .os_info(FixedOsInfo::new("linux", "amd64"))
            .resources(StaticResources::new())
            .host(std::sync::Arc::new(cryptostream::DylibHost))
            .logical_name("cryptostream-cli-test-missing")
            .build()
            .resolve_and_load()
    }

    #[test]
    fn test_crypto_settings_default() {
        let settings = CryptoSettings::from_config(&Config::empty()).unwrap();

        assert_eq!(settings.suite, CipherSuite::AesCtrNoPadding);
        assert_eq!(settings.buffer_size, 8192);
    }

    #[test]
    fn test_crypto_settings_floor_buffer_size_to_block() {
        let config = Config::empty().with(keys::CRYPTO_BUFFER_SIZE, "1000");

        let settings = CryptoSettings::from_config(&config).unwrap();

        assert_eq!(settings.buffer_size, 992);
    }

    #[test]
    fn test_crypto_settings_reject_small_buffer() {
        let config = Config::empty().with(keys::CRYPTO_BUFFER_SIZE, "64");

        let Err(err) = CryptoSettings::from_config(&config) else {
            panic!("expected small buffer to be rejected");
        };
        assert!(format!("{err:#}").contains("minimum value of buffer size is 512"));
    }

    #[test]
    fn test_crypto_settings_reject_unknown_suite() {
        let config = Config::empty().with(keys::CRYPTO_CIPHER_SUITE, "DES/ECB/PKCS5Padding");

        assert!(CryptoSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_render_table_lists_each_failed_strategy() {
        let report = unavailable_report();
        let settings = CryptoSettings::from_config(&Config::empty());

        let table = render_table(&report, &settings).unwrap();

        assert!(table.contains("Linux/x86_64"));
        assert!(table.contains("libcryptostream-cli-test-missing.so"));
        assert!(table.contains("no library path configured"));
        assert!(table.contains("no native library is found for os.name=Linux and os.arch=x86_64"));
        assert!(table.contains("using builtin implementations"));
        assert!(table.contains("AES/CTR/NoPadding"));
    }

    #[test]
    fn test_render_table_reports_invalid_settings_after_native_status() {
        let report = unavailable_report();
        let config = Config::empty().with(keys::CRYPTO_BUFFER_SIZE, "lots");
        let settings = CryptoSettings::from_config(&config);

        let table = render_table(&report, &settings).unwrap();

        assert!(table.contains("unavailable"));
        assert!(table.contains("invalid buffer size configuration"));
        assert!(table.contains("cryptostream.crypto.buffer.size"));
        assert!(!table.contains("Buffer size"));
    }

    #[test]
    fn test_report_serializes_with_snake_case_status() {
        let report = unavailable_report();

        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["failures"][0]["strategy"], "configured_path");
    }
}
