//! Shows how this host maps to a bundled native library.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use cryptostream::{
    BundledResources, NativeLoader,
    version::{VersionMetadata, resolve_version},
};

use super::OutputFormat;

#[derive(Args)]
pub struct PlatformArgs {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

pub fn run(args: &PlatformArgs) -> Result<()> {
    let loader = cryptostream::native_loader();
    let version = resolve_version(&BundledResources);
    let details = describe(loader, &version);

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&details).context("failed to serialize platform")?
        ),
        OutputFormat::Table => {
            println!("{}", style("Platform").bold().underlined());
            println!();
            for (label, key) in [
                ("OS", "os"),
                ("Arch", "arch"),
                ("Folder", "folder"),
                ("Library", "library"),
                ("Bundled", "bundled"),
                ("Version", "version"),
            ] {
                let value = details[key].as_str().unwrap_or("none");
                println!("{}: {value}", style(label).cyan());
            }
            println!(
                "{}: {}",
                style("Resources").cyan(),
                BundledResources::paths().len()
            );
        }
    }

    Ok(())
}

fn describe(loader: &NativeLoader, version: &VersionMetadata) -> serde_json::Value {
    let platform = loader.platform();
    let spec = loader.library_spec();
    let bundled = loader
        .find_bundled(&spec)
        .ok()
        .map(|bundled| bundled.resource_path());

    serde_json::json!({
        "os": platform.os_name,
        "arch": platform.arch_name,
        "folder": platform.lib_folder_path,
        "library": spec.resolved_name,
        "configuredPath": spec.configured_path,
        "bundled": bundled,
        "version": version.sanitized,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cryptostream::{Config, DylibHost, platform::FixedOsInfo, resource::StaticResources};

    use super::*;

    fn loader(os: &str, arch: &str, resources: StaticResources) -> NativeLoader {
        NativeLoader::builder()
            .config(Config::empty())
            .os_info(FixedOsInfo::new(os, arch))
            .resources(resources)
            .host(Arc::new(DylibHost))
            .build()
    }

    #[test]
    fn test_describe_reports_bundled_resource() {
        let resources = StaticResources::new().with(
            "cryptostream/native/Mac/aarch64/libcryptostream.dylib",
            b"macho".as_slice(),
        );
        let loader = loader("Mac OS X", "arm64", resources);

        let details = describe(&loader, &VersionMetadata::from_raw("2.1.0-SNAPSHOT"));

        assert_eq!(details["folder"], "Mac/aarch64");
        assert_eq!(details["library"], "libcryptostream.dylib");
        assert_eq!(
            details["bundled"],
            "cryptostream/native/Mac/aarch64/libcryptostream.dylib"
        );
        assert_eq!(details["version"], "2.1.0");
        assert!(details["configuredPath"].is_null());
    }

    #[test]
    fn test_describe_without_bundle_is_null() {
        let loader = loader("windows", "x86", StaticResources::new());

        let details = describe(&loader, &VersionMetadata::unknown());

        assert_eq!(details["library"], "cryptostream.dll");
        assert!(details["bundled"].is_null());
        assert_eq!(details["version"], "unknown");
    }
}
