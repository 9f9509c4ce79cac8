//! Library file-name resolution.

use std::path::PathBuf;

use serde::Serialize;

use crate::platform::{MAC, PlatformDescriptor, WINDOWS};

/// Logical name of the native library.
pub const LOGICAL_NAME: &str = "cryptostream";

/// Maps a logical library name to the platform's file name.
///
/// Unknown platforms use the `lib<name>.so` pattern.
#[must_use]
pub fn map_library_name(os_name: &str, logical_name: &str) -> String {
    match os_name {
        WINDOWS => format!("{logical_name}.dll"),
        MAC => format!("lib{logical_name}.dylib"),
        _ => format!("lib{logical_name}.so"),
    }
}

/// Older macOS toolchains package JNI-style libraries with this extension.
#[must_use]
pub fn alternate_library_name(logical_name: &str) -> String {
    format!("lib{logical_name}.jnilib")
}

/// Which file to load, and where an explicit copy may live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibrarySpec {
    pub configured_path: Option<PathBuf>,
    pub configured_name: Option<String>,
    pub resolved_name: String,
}

impl LibrarySpec {
    /// Pure mapping, no I/O. An empty configured name counts as unset.
    #[must_use]
    pub fn resolve(
        configured_path: Option<PathBuf>,
        configured_name: Option<String>,
        logical_name: &str,
        platform: &PlatformDescriptor,
    ) -> Self {
        let configured_name = configured_name.filter(|name| !name.trim().is_empty());
        let resolved_name = configured_name
            .clone()
            .unwrap_or_else(|| map_library_name(&platform.os_name, logical_name));
        Self {
            configured_path,
            configured_name,
            resolved_name,
        }
    }

    /// `{configured_path}/{resolved_name}`, when a path is configured.
    #[must_use]
    pub fn configured_file(&self) -> Option<PathBuf> {
        self.configured_path
            .as_ref()
            .map(|dir| dir.join(&self.resolved_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::FixedOsInfo;

    fn platform(os: &str) -> PlatformDescriptor {
        PlatformDescriptor::describe(&FixedOsInfo::new(os, "x86_64"))
    }

    #[test]
    fn test_map_library_name_per_platform() {
        assert_eq!(map_library_name("Linux", "cryptostream"), "libcryptostream.so");
        assert_eq!(map_library_name("Windows", "cryptostream"), "cryptostream.dll");
        assert_eq!(map_library_name("Mac", "cryptostream"), "libcryptostream.dylib");
        assert_eq!(map_library_name("SunOS", "cryptostream"), "libcryptostream.so");
        assert_eq!(alternate_library_name("cryptostream"), "libcryptostream.jnilib");
    }

    #[test]
    fn test_resolve_defaults_to_platform_mapping() {
        let spec = LibrarySpec::resolve(None, None, LOGICAL_NAME, &platform("windows"));

        assert_eq!(spec.resolved_name, "cryptostream.dll");
        assert_eq!(spec.configured_file(), None);
    }

    #[test]
    fn test_resolve_prefers_configured_name() {
        let spec = LibrarySpec::resolve(
            Some(PathBuf::from("/opt/native")),
            Some("libcs-custom.so".to_string()),
            LOGICAL_NAME,
            &platform("linux"),
        );

        assert_eq!(spec.resolved_name, "libcs-custom.so");
        assert_eq!(
            spec.configured_file(),
            Some(PathBuf::from("/opt/native/libcs-custom.so"))
        );
    }

    #[test]
    fn test_blank_configured_name_is_ignored() {
        let spec = LibrarySpec::resolve(None, Some("  ".to_string()), LOGICAL_NAME, &platform("linux"));

        assert_eq!(spec.configured_name, None);
        assert_eq!(spec.resolved_name, "libcryptostream.so");
    }
}
