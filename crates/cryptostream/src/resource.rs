//! Bundled resources: native libraries and metadata shipped with the
//! distributable.
//!
//! Resources are addressed by `/`-separated relative paths such as
//! `cryptostream/native/Linux/x86_64/libcryptostream.so`. A leading `/` is
//! ignored so paths can be written either way.
//!
//! # Registering a bundled library
//!
//! Packaging crates embed the shared object at compile time and submit it to
//! the process-wide registry read by [`BundledResources`]:
//!
//! ```ignore
//! cryptostream::inventory::submit! {
//!     cryptostream::BundledResource::new(
//!         "cryptostream/native/Linux/x86_64/libcryptostream.so",
//!         include_bytes!(concat!(env!("OUT_DIR"), "/libcryptostream.so")),
//!     )
//! }
//! ```

use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    fs::File,
    io::{self, Cursor, Read},
    path::{Component, Path, PathBuf},
};

/// Read access to packaged resources.
pub trait ResourceProvider: Send + Sync {
    /// Opens the resource at `path` for streaming.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`io::ErrorKind::NotFound`] when the resource
    /// does not exist, or any other I/O error raised while opening it.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;

    /// Returns `true` if a resource exists at `path`.
    fn contains(&self, path: &str) -> bool {
        self.open(path).is_ok()
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("resource not found: {path}"),
    )
}

/// A resource compiled into the binary and registered with
/// [`inventory::submit!`].
#[derive(Debug, Clone, Copy)]
pub struct BundledResource {
    path: &'static str,
    bytes: &'static [u8],
}

impl BundledResource {
    #[must_use]
    pub const fn new(path: &'static str, bytes: &'static [u8]) -> Self {
        Self { path, bytes }
    }

    #[must_use]
    pub fn path(&self) -> &'static str {
        self.path
    }

    #[must_use]
    pub fn bytes(&self) -> &'static [u8] {
        self.bytes
    }
}

inventory::collect!(BundledResource);

inventory::submit! {
    BundledResource::new(
        crate::version::VERSION_RESOURCE,
        concat!("VERSION=", env!("CARGO_PKG_VERSION"), "\n").as_bytes(),
    )
}

/// Resources registered in this process through [`inventory`].
///
/// When several registrations share a path, the first one found wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct BundledResources;

impl BundledResources {
    fn find(path: &str) -> Option<&'static BundledResource> {
        let path = normalize(path);
        inventory::iter::<BundledResource>
            .into_iter()
            .find(|resource| normalize(resource.path) == path)
    }

    /// Lists the paths of every registered resource.
    #[must_use]
    pub fn paths() -> Vec<&'static str> {
        inventory::iter::<BundledResource>
            .into_iter()
            .map(|resource| resource.path)
            .collect()
    }
}

impl ResourceProvider for BundledResources {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let resource = Self::find(path).ok_or_else(|| not_found(path))?;
        Ok(Box::new(Cursor::new(resource.bytes)))
    }

    fn contains(&self, path: &str) -> bool {
        Self::find(path).is_some()
    }
}

/// Resources laid out as files below a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a resource path below the root, refusing anything that would
    /// escape it.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(normalize(path));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl ResourceProvider for DirectoryResources {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let full = self.resolve(path).ok_or_else(|| not_found(path))?;
        if !full.is_file() {
            return Err(not_found(path));
        }
        Ok(Box::new(File::open(full)?))
    }

    fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some_and(|full| full.is_file())
    }
}

/// An owned, in-memory set of resources.
#[derive(Default, Clone)]
pub struct StaticResources {
    entries: HashMap<String, Cow<'static, [u8]>>,
}

impl fmt::Debug for StaticResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<_> = self.entries.keys().collect();
        paths.sort();
        f.debug_struct("StaticResources")
            .field("paths", &paths)
            .finish()
    }
}

impl StaticResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a resource.
    #[must_use]
    pub fn with(mut self, path: &str, bytes: impl Into<Cow<'static, [u8]>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&mut self, path: &str, bytes: impl Into<Cow<'static, [u8]>>) {
        self.entries
            .insert(normalize(path).to_string(), bytes.into());
    }
}

impl ResourceProvider for StaticResources {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let bytes = self
            .entries
            .get(normalize(path))
            .ok_or_else(|| not_found(path))?;
        Ok(Box::new(Cursor::new(bytes.as_ref())))
    }

    fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(normalize(path))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn read_all(provider: &dyn ResourceProvider, path: &str) -> Vec<u8> {
        let mut out = Vec::new();
        provider
            .open(path)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_static_resources_ignore_leading_slash() {
        let resources = StaticResources::new().with("/a/b.bin", b"abc".as_slice());

        assert!(resources.contains("a/b.bin"));
        assert!(resources.contains("/a/b.bin"));
        assert_eq!(read_all(&resources, "a/b.bin"), b"abc");
    }

    #[test]
    fn test_missing_resource_is_not_found() {
        let resources = StaticResources::new();

        let Err(err) = resources.open("nope") else {
            panic!("expected missing resource to fail");
        };
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!resources.contains("nope"));
    }

    #[test]
    fn test_directory_resources_read_files_below_root() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("native/Linux")).unwrap();
        fs::write(temp.path().join("native/Linux/lib.so"), b"elf").unwrap();
        let resources = DirectoryResources::new(temp.path());

        assert!(resources.contains("/native/Linux/lib.so"));
        assert!(!resources.contains("native/Linux"));
        assert_eq!(read_all(&resources, "native/Linux/lib.so"), b"elf");
    }

    #[test]
    fn test_directory_resources_refuse_parent_components() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("inner");
        fs::create_dir_all(&inner).unwrap();
        fs::write(temp.path().join("secret"), b"x").unwrap();
        let resources = DirectoryResources::new(&inner);

        assert!(!resources.contains("../secret"));
        assert!(resources.open("../secret").is_err());
    }

    #[test]
    fn test_bundled_resources_include_own_version_marker() {
        let resources = BundledResources;

        assert!(BundledResources::paths().contains(&crate::version::VERSION_RESOURCE));
        let text = String::from_utf8(read_all(&resources, crate::version::VERSION_RESOURCE))
            .unwrap();
        assert_eq!(
            text.trim(),
            format!("VERSION={}", env!("CARGO_PKG_VERSION"))
        );
    }
}
