//! Host OS/arch identification, normalized into the folder names used by
//! bundled native libraries.

use serde::Serialize;

/// Supplies the raw operating-system name and architecture of the host.
pub trait OsInfo: Send + Sync {
    fn os_name(&self) -> String;
    fn arch_name(&self) -> String;
}

/// [`OsInfo`] for the platform this binary was compiled for.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostOsInfo;

impl OsInfo for HostOsInfo {
    fn os_name(&self) -> String {
        std::env::consts::OS.to_string()
    }

    fn arch_name(&self) -> String {
        std::env::consts::ARCH.to_string()
    }
}

/// Fixed OS/arch strings, for cross-platform probing and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedOsInfo {
    pub os: String,
    pub arch: String,
}

impl FixedOsInfo {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }
}

impl OsInfo for FixedOsInfo {
    fn os_name(&self) -> String {
        self.os.clone()
    }

    fn arch_name(&self) -> String {
        self.arch.clone()
    }
}

/// Canonical OS name for macOS.
pub const MAC: &str = "Mac";
pub const LINUX: &str = "Linux";
pub const WINDOWS: &str = "Windows";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformDescriptor {
    pub os_name: String,
    pub arch_name: String,
    /// `"{os_name}/{arch_name}"`.
    pub lib_folder_path: String,
}

impl PlatformDescriptor {
    /// Normalizes what `info` reports. Never fails: unrecognized values are
    /// passed through in a cleaned-up form.
    pub fn describe(info: &dyn OsInfo) -> Self {
        let os_name = normalize_os(&info.os_name());
        let arch_name = normalize_arch(&info.arch_name());
        let lib_folder_path = format!("{os_name}/{arch_name}");
        Self {
            os_name,
            arch_name,
            lib_folder_path,
        }
    }

    #[must_use]
    pub fn host() -> Self {
        Self::describe(&HostOsInfo)
    }

    #[must_use]
    pub fn is_mac(&self) -> bool {
        self.os_name == MAC
    }
}

#[must_use]
pub fn normalize_os(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    if lower.starts_with("windows") {
        return WINDOWS.to_string();
    }
    match lower.as_str() {
        "linux" => LINUX.to_string(),
        "macos" | "darwin" | "mac os x" | "mac" | "osx" => MAC.to_string(),
        "freebsd" => "FreeBSD".to_string(),
        "aix" => "AIX".to_string(),
        _ => {
            let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            if cleaned.is_empty() {
                "Unknown".to_string()
            } else {
                cleaned
            }
        }
    }
}

#[must_use]
pub fn normalize_arch(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "x86_64" | "amd64" | "x86-64" | "em64t" | "universal" => "x86_64",
        "x86" | "i386" | "i486" | "i586" | "i686" => "x86",
        "aarch64" | "arm64" => "aarch64",
        "powerpc64le" | "ppc64le" => "ppc64le",
        "powerpc64" | "ppc64" => "ppc64",
        "s390x" => "s390x",
        arm64 if arm64.starts_with("arm64") => "aarch64",
        arm if arm.starts_with("arm") => "arm",
        _ => "",
    };
    if !canonical.is_empty() {
        return canonical.to_string();
    }
    let cleaned: String = lower.chars().filter(char::is_ascii_alphanumeric).collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
