//! Resolution and loading of the native cryptostream library.
//!
//! [`NativeLoader`] tries, in order and stopping at the first success:
//!
//! 1. [`Strategy::ConfiguredPath`]: `{cryptostream.lib.path}/{library name}`
//!    when that file exists
//! 2. [`Strategy::SystemPath`]: the library name through the host's standard
//!    search path
//! 3. [`Strategy::Bundled`]: the library bundled for this OS/arch, extracted
//!    to the temp directory and loaded from there
//!
//! A failing strategy is recorded in the [`LoadReport`] and the next one is
//! tried. Nothing escapes [`NativeLoader::ensure_loaded`]: if every
//! strategy fails the report is [`LoadStatus::Unavailable`] and callers use
//! their pure software path.

use std::{
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, OnceLock, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    cleanup,
    config::Config,
    extract::{self, ExtractError, ExtractedArtifact, ExtractionRequest},
    library::{LOGICAL_NAME, LibrarySpec, alternate_library_name},
    platform::{HostOsInfo, OsInfo, PlatformDescriptor},
    random::{self, SecureRandom},
    resource::{BundledResources, ResourceProvider},
    version::resolve_version,
};

/// Root of the bundled native libraries; the platform folder is appended.
pub const NATIVE_RESOURCE_ROOT: &str = "cryptostream/native";

/// Errors that can occur when loading a library into the process.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Failed to load the dynamic library.
    #[error("failed to load library: {0}")]
    LibraryLoad(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Checksum mismatch.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// The host's library-loading primitive.
pub trait LibraryHost: Send + Sync {
    /// Loads the library at an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the library cannot be loaded.
    fn load(&self, path: &Path) -> Result<(), LoadError>;

    /// Loads a library by file name through the system search path.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if no loadable library is found.
    fn load_by_name(&self, name: &str) -> Result<(), LoadError>;
}

/// Every library opened by [`DylibHost`]. Never drained, so nothing is
/// unloaded before the process exits.
static OPENED: Mutex<Vec<libloading::Library>> = Mutex::new(Vec::new());

/// [`LibraryHost`] backed by the platform dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibHost;

impl DylibHost {
    fn open(target: &OsStr) -> Result<(), LoadError> {
        // SAFETY: loading a library runs its initializers. The libraries
        // reached here are either explicitly configured, found on the system
        // search path under the expected name, or byte-verified copies of the
        // bundled artifact.
        let library = unsafe { libloading::Library::new(target) }
            .map_err(|e| LoadError::LibraryLoad(e.to_string()))?;
        OPENED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(library);
        Ok(())
    }
}

impl LibraryHost for DylibHost {
    fn load(&self, path: &Path) -> Result<(), LoadError> {
        if !path.is_absolute() {
            return Err(LoadError::InvalidPath(path.display().to_string()));
        }
        Self::open(path.as_os_str())
    }

    fn load_by_name(&self, name: &str) -> Result<(), LoadError> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(LoadError::InvalidPath(name.to_string()));
        }
        Self::open(OsStr::new(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ConfiguredPath,
    SystemPath,
    Bundled,
}

impl Strategy {
    pub const ORDER: [Strategy; 3] = [Self::ConfiguredPath, Self::SystemPath, Self::Bundled];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConfiguredPath => "configured path",
            Self::SystemPath => "system library path",
            Self::Bundled => "bundled resource",
        })
    }
}

/// Why a single strategy did not produce a loaded library.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("no library path configured")]
    NotConfigured,

    #[error("configured library does not exist: {}", .0.display())]
    Missing(PathBuf),

    #[error("no native library is found for os.name={os} and os.arch={arch}")]
    ResourceNotFound { os: String, arch: String },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    NotAttempted,
    Attempting,
    Loaded,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: Strategy,
    pub error: String,
}

/// Terminal outcome of one resolution run.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub status: LoadStatus,
    pub platform: PlatformDescriptor,
    pub library: LibrarySpec,
    /// Strategy that loaded the library.
    pub strategy: Option<Strategy>,
    /// Absolute path, or the bare name for [`Strategy::SystemPath`].
    pub loaded_from: Option<PathBuf>,
    pub artifact: Option<ExtractedArtifact>,
    pub failures: Vec<StrategyFailure>,
}

impl LoadReport {
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.status == LoadStatus::Loaded
    }
}

/// Where the bundled library for the current platform lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledLibrary {
    pub folder: String,
    pub file_name: String,
}

impl BundledLibrary {
    #[must_use]
    pub fn resource_path(&self) -> String {
        format!("{}/{}", self.folder, self.file_name)
    }
}

struct Loaded {
    path: PathBuf,
    artifact: Option<ExtractedArtifact>,
}

/// Resolves and loads the native library once per instance.
pub struct NativeLoader {
    logical_name: String,
    config: Config,
    platform: PlatformDescriptor,
    resources: Arc<dyn ResourceProvider>,
    host: Arc<dyn LibraryHost>,
    random: Arc<dyn SecureRandom>,
    attempting: AtomicBool,
    report: OnceLock<LoadReport>,
}

impl fmt::Debug for NativeLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLoader")
            .field("logical_name", &self.logical_name)
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("random", &self.random.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl NativeLoader {
    #[must_use]
    pub fn builder() -> NativeLoaderBuilder {
        NativeLoaderBuilder::default()
    }

    /// Loader for this process: configuration from the environment and
    /// bundled properties, bundled resources, and the platform dynamic
    /// loader.
    #[must_use]
    pub fn from_environment() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn platform(&self) -> &PlatformDescriptor {
        &self.platform
    }

    #[must_use]
    pub fn library_spec(&self) -> LibrarySpec {
        LibrarySpec::resolve(
            self.config.lib_path().map(Path::to_path_buf),
            self.config.lib_name().map(str::to_string),
            &self.logical_name,
            &self.platform,
        )
    }

    #[must_use]
    pub fn status(&self) -> LoadStatus {
        match self.report.get() {
            Some(report) => report.status,
            None if self.attempting.load(Ordering::SeqCst) => LoadStatus::Attempting,
            None => LoadStatus::NotAttempted,
        }
    }

    /// Runs resolution on first call; later and concurrent calls get the
    /// same report without retrying.
    pub fn ensure_loaded(&self) -> &LoadReport {
        self.report.get_or_init(|| {
            self.attempting.store(true, Ordering::SeqCst);
            self.resolve_and_load()
        })
    }

    /// Runs every strategy in order and reports the outcome. Unlike
    /// [`ensure_loaded`](Self::ensure_loaded) this does not cache.
    #[must_use]
    pub fn resolve_and_load(&self) -> LoadReport {
        debug!(
            library = %self.logical_name,
            "Trying to load the custom-built native library..."
        );
        let spec = self.library_spec();
        let mut report = LoadReport {
            status: LoadStatus::Unavailable,
            platform: self.platform.clone(),
            library: spec.clone(),
            strategy: None,
            loaded_from: None,
            artifact: None,
            failures: Vec::new(),
        };

        for strategy in Strategy::ORDER {
            let Some(loaded) = soften(strategy, self.attempt(strategy, &spec), &mut report.failures)
            else {
                continue;
            };
            info!(
                strategy = %strategy,
                path = %loaded.path.display(),
                "Loaded the native {} library",
                self.logical_name
            );
            report.status = LoadStatus::Loaded;
            report.strategy = Some(strategy);
            report.loaded_from = Some(loaded.path);
            report.artifact = loaded.artifact;
            return report;
        }

        warn!(
            library = %self.logical_name,
            os = %self.platform.os_name,
            arch = %self.platform.arch_name,
            "Unable to load native library for your platform... using builtin implementations where applicable"
        );
        report
    }

    fn attempt(&self, strategy: Strategy, spec: &LibrarySpec) -> Result<Loaded, StrategyError> {
        match strategy {
            Strategy::ConfiguredPath => self.load_configured(spec),
            Strategy::SystemPath => self.load_system(spec),
            Strategy::Bundled => self.load_bundled(spec),
        }
    }

    fn load_configured(&self, spec: &LibrarySpec) -> Result<Loaded, StrategyError> {
        let file = spec.configured_file().ok_or(StrategyError::NotConfigured)?;
        if !file.is_file() {
            return Err(StrategyError::Missing(file));
        }
        let file = std::path::absolute(&file)
            .map_err(|e| LoadError::InvalidPath(format!("{}: {e}", file.display())))?;
        if let Some(expected) = self.config.lib_checksum() {
            verify_checksum(&file, expected)?;
        }
        self.host.load(&file)?;
        Ok(Loaded {
            path: file,
            artifact: None,
        })
    }

    fn load_system(&self, spec: &LibrarySpec) -> Result<Loaded, StrategyError> {
        self.host.load_by_name(&spec.resolved_name)?;
        Ok(Loaded {
            path: PathBuf::from(&spec.resolved_name),
            artifact: None,
        })
    }

    fn load_bundled(&self, spec: &LibrarySpec) -> Result<Loaded, StrategyError> {
        let bundled = self.find_bundled(spec)?;
        let artifact = self.extract(&bundled, &self.config.temp_dir())?;
        cleanup::delete_on_exit(&artifact.file_path);
        self.host.load(&artifact.file_path)?;
        Ok(Loaded {
            path: artifact.file_path.clone(),
            artifact: Some(artifact),
        })
    }

    /// Locates the bundled library for this platform, retrying with the
    /// `.jnilib` name on macOS.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::ResourceNotFound`] when nothing is bundled for
    /// this OS/arch.
    pub fn find_bundled(&self, spec: &LibrarySpec) -> Result<BundledLibrary, StrategyError> {
        let folder = format!("{NATIVE_RESOURCE_ROOT}/{}", self.platform.lib_folder_path);
        let mut candidates = vec![spec.resolved_name.clone()];
        if self.platform.is_mac() {
            candidates.push(alternate_library_name(&self.logical_name));
        }

        candidates
            .into_iter()
            .map(|file_name| BundledLibrary {
                folder: folder.clone(),
                file_name,
            })
            .find(|candidate| self.resources.contains(&candidate.resource_path()))
            .ok_or_else(|| StrategyError::ResourceNotFound {
                os: self.platform.os_name.clone(),
                arch: self.platform.arch_name.clone(),
            })
    }

    /// Extracts the bundled library for this platform into `target_folder`
    /// without loading it. The file is kept after the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError`] if nothing is bundled for this platform or
    /// extraction fails.
    pub fn extract_bundled(&self, target_folder: &Path) -> Result<ExtractedArtifact, StrategyError> {
        let bundled = self.find_bundled(&self.library_spec())?;
        Ok(self.extract(&bundled, target_folder)?)
    }

    fn extract(
        &self,
        bundled: &BundledLibrary,
        target_folder: &Path,
    ) -> Result<ExtractedArtifact, ExtractError> {
        let version = resolve_version(&*self.resources);
        let request = ExtractionRequest {
            logical_name: self.logical_name.clone(),
            source_folder: bundled.folder.clone(),
            library_file_name: bundled.file_name.clone(),
            target_folder: target_folder.to_path_buf(),
        };
        extract::extract(&*self.resources, &request, &version.sanitized, &*self.random)
    }
}

/// Turns a strategy failure into "try the next one".
fn soften(
    strategy: Strategy,
    result: Result<Loaded, StrategyError>,
    failures: &mut Vec<StrategyFailure>,
) -> Option<Loaded> {
    match result {
        Ok(loaded) => Some(loaded),
        Err(e) => {
            debug!(strategy = %strategy, error = %e, "Native library strategy failed");
            failures.push(StrategyFailure {
                strategy,
                error: e.to_string(),
            });
            None
        }
    }
}

fn verify_checksum(path: &Path, expected: &str) -> Result<(), LoadError> {
    let file_bytes = std::fs::read(path).map_err(|e| LoadError::LibraryLoad(e.to_string()))?;
    let digest = sha256::digest(&file_bytes[..]);
    if !digest.eq_ignore_ascii_case(expected) {
        return Err(LoadError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: digest,
        });
    }
    debug!(path = %path.display(), checksum = %digest, "Checksum verified");
    Ok(())
}

/// Builder for [`NativeLoader`]; unset parts use the process defaults.
#[derive(Default)]
pub struct NativeLoaderBuilder {
    logical_name: Option<String>,
    config: Option<Config>,
    os_info: Option<Box<dyn OsInfo>>,
    resources: Option<Arc<dyn ResourceProvider>>,
    host: Option<Arc<dyn LibraryHost>>,
    random: Option<Arc<dyn SecureRandom>>,
}

impl NativeLoaderBuilder {
    #[must_use]
    pub fn logical_name(mut self, name: impl Into<String>) -> Self {
        self.logical_name = Some(name.into());
        self
    }

    /// Uses `config` instead of loading it from the environment and bundled
    /// properties.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn os_info(mut self, os_info: impl OsInfo + 'static) -> Self {
        self.os_info = Some(Box::new(os_info));
        self
    }

    #[must_use]
    pub fn resources(mut self, resources: impl ResourceProvider + 'static) -> Self {
        self.resources = Some(Arc::new(resources));
        self
    }

    #[must_use]
    pub fn host(mut self, host: Arc<dyn LibraryHost>) -> Self {
        self.host = Some(host);
        self
    }

    #[must_use]
    pub fn random(mut self, random: Arc<dyn SecureRandom>) -> Self {
        self.random = Some(random);
        self
    }

    #[must_use]
    pub fn build(self) -> NativeLoader {
        let resources = self
            .resources
            .unwrap_or_else(|| Arc::new(BundledResources));
        let config = self.config.unwrap_or_else(|| Config::load(&*resources));
        let os_info = self.os_info.unwrap_or_else(|| Box::new(HostOsInfo));
        let random = self.random.unwrap_or_else(|| random::from_config(&config));

        NativeLoader {
            logical_name: self
                .logical_name
                .unwrap_or_else(|| LOGICAL_NAME.to_string()),
            platform: PlatformDescriptor::describe(&*os_info),
            config,
            resources,
            host: self.host.unwrap_or_else(|| Arc::new(DylibHost)),
            random,
            attempting: AtomicBool::new(false),
            report: OnceLock::new(),
        }
    }
}
