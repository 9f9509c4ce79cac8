//! Packaged version metadata, used to name extracted libraries.

use std::io::{self, Read};

use serde::Serialize;
use tracing::warn;

use crate::{config::parse_properties, resource::ResourceProvider};

/// Build metadata written by the packaging step; read first.
pub const BUILD_METADATA_RESOURCE: &str = "cryptostream/build.properties";
/// Plain version marker; this crate registers one for itself.
pub const VERSION_RESOURCE: &str = "cryptostream/VERSION";

pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionMetadata {
    pub raw: String,
    pub sanitized: String,
}

impl VersionMetadata {
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            raw: UNKNOWN_VERSION.to_string(),
            sanitized: UNKNOWN_VERSION.to_string(),
        }
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let sanitized = sanitize(&raw);
        Self { raw, sanitized }
    }
}

/// Keeps ASCII digits, `.` and `M`. `"unknown"`, and anything that would
/// sanitize to nothing, becomes `"unknown"`.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let raw = raw.trim();
    if raw == UNKNOWN_VERSION {
        return raw.to_string();
    }
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == 'M')
        .collect();
    if kept.is_empty() {
        UNKNOWN_VERSION.to_string()
    } else {
        kept
    }
}

/// Reads the version from the first metadata resource that exists.
///
/// Never fails; any read error is logged and yields `"unknown"`.
pub fn resolve_version(resources: &dyn ResourceProvider) -> VersionMetadata {
    let Some(resource) = [BUILD_METADATA_RESOURCE, VERSION_RESOURCE]
        .into_iter()
        .find(|path| resources.contains(path))
    else {
        return VersionMetadata::unknown();
    };

    match read_version(resources, resource) {
        Ok(raw) => VersionMetadata::from_raw(raw),
        Err(e) => {
            warn!(resource, error = %e, "Could not read version metadata");
            VersionMetadata::unknown()
        }
    }
}

fn read_version(resources: &dyn ResourceProvider, resource: &str) -> io::Result<String> {
    let mut text = String::new();
    resources.open(resource)?.read_to_string(&mut text)?;

    let properties = parse_properties(&text);
    let lookup = |key: &str| {
        properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    let version = lookup("version").unwrap_or_else(|| UNKNOWN_VERSION.to_string());
    if version == UNKNOWN_VERSION {
        return Ok(lookup("VERSION").unwrap_or(version));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::StaticResources;

    #[test]
    fn test_sanitize_strips_snapshot_suffix() {
        assert_eq!(sanitize("1.2.3-SNAPSHOT"), "1.2.3");
        assert_eq!(sanitize(" 2.0.0-M1 "), "2.0.0M1");
        assert_eq!(sanitize("unknown"), "unknown");
        assert_eq!(sanitize("nightly"), "unknown");
    }

    #[test]
    fn test_no_metadata_yields_unknown() {
        let version = resolve_version(&StaticResources::new());

        assert_eq!(version, VersionMetadata::unknown());
    }

    #[test]
    fn test_build_metadata_wins_over_version_marker() {
        let resources = StaticResources::new()
            .with(
                BUILD_METADATA_RESOURCE,
                b"#Generated\nversion=1.2.3-SNAPSHOT\ngroupId=cryptostream\n".as_slice(),
            )
            .with(VERSION_RESOURCE, b"VERSION=9.9.9".as_slice());

        let version = resolve_version(&resources);

        assert_eq!(version.raw, "1.2.3-SNAPSHOT");
        assert_eq!(version.sanitized, "1.2.3");
    }

    #[test]
    fn test_version_marker_uses_upper_case_key() {
        let resources = StaticResources::new().with(VERSION_RESOURCE, b"VERSION=0.4.1\n".as_slice());

        assert_eq!(resolve_version(&resources).sanitized, "0.4.1");
    }

    #[test]
    fn test_metadata_without_known_keys_is_unknown() {
        let resources = StaticResources::new().with(BUILD_METADATA_RESOURCE, b"name=x\n".as_slice());

        assert_eq!(resolve_version(&resources), VersionMetadata::unknown());
    }

    #[test]
    fn test_unreadable_metadata_is_unknown() {
        let resources =
            StaticResources::new().with(VERSION_RESOURCE, vec![0xff, 0xfe, 0x00]);

        assert_eq!(resolve_version(&resources), VersionMetadata::unknown());
    }
}
