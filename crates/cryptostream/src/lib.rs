//! Resolution and loading of the native cryptostream library.
//!
//! The crate finds a platform-specific native library, extracts it from the
//! bundled resources when no installed copy is available, and loads it into
//! the process. Native support is optional: when nothing can be loaded the
//! outcome is [`LoadStatus::Unavailable`] and callers fall back to their
//! software implementations.
//!
//! # Key Components
//!
//! - **Loading**: [`NativeLoader`] tries a configured path, the system search
//!   path, then the bundled copy
//! - **Resources**: [`ResourceProvider`] with libraries registered through
//!   [`inventory`]
//! - **Configuration**: [`Config`] layered from overrides, the environment,
//!   and `cryptostream.properties`
//!
//! # Example
//!
//! ```no_run
//! if cryptostream::is_native_loaded() {
//!     println!("using native cipher");
//! } else {
//!     println!("using builtin cipher");
//! }
//! ```
//!
//! # Bundling a library
//!
//! ```ignore
//! cryptostream::inventory::submit! {
//!     cryptostream::BundledResource::new(
//!         "cryptostream/native/Linux/x86_64/libcryptostream.so",
//!         include_bytes!("../native/Linux/x86_64/libcryptostream.so"),
//!     )
//! }
//! ```

use std::sync::LazyLock;

pub mod cipher;
mod cleanup;
pub mod config;
pub mod extract;
pub mod library;
pub mod loader;
pub mod platform;
pub mod random;
pub mod resource;
pub mod version;

pub use cipher::{CipherSuite, UnsupportedCodecError};
pub use config::{Config, ConfigError};
pub use extract::{ExtractError, ExtractedArtifact};
pub use inventory;
pub use library::LibrarySpec;
pub use loader::{
    DylibHost, LibraryHost, LoadError, LoadReport, LoadStatus, NativeLoader, Strategy,
    StrategyError,
};
pub use platform::{OsInfo, PlatformDescriptor};
pub use resource::{BundledResource, BundledResources, ResourceProvider};
pub use version::VersionMetadata;

static NATIVE_LOADER: LazyLock<NativeLoader> = LazyLock::new(NativeLoader::from_environment);

/// The process-wide loader.
#[must_use]
pub fn native_loader() -> &'static NativeLoader {
    &NATIVE_LOADER
}

/// Outcome of loading the native library for this process, attempting it on
/// first call.
#[must_use]
pub fn load_report() -> &'static LoadReport {
    NATIVE_LOADER.ensure_loaded()
}

/// Whether the native library is loaded in this process.
#[must_use]
pub fn is_native_loaded() -> bool {
    load_report().is_loaded()
}
