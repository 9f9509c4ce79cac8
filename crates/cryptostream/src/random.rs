//! Pluggable secure random source, selected by
//! [`SECURE_RANDOM_IMPL`](crate::config::keys::SECURE_RANDOM_IMPL).

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use rand::{RngCore, rngs::OsRng};
use tracing::warn;

use crate::config::Config;

/// Name selecting [`OsSecureRandom`].
pub const OS_IMPL: &str = "os";
/// Name selecting [`DeviceSecureRandom`].
pub const DEVICE_IMPL: &str = "device";

#[derive(Debug, thiserror::Error)]
pub enum RandomError {
    #[error("OS random source failed: {0}")]
    Os(#[from] rand::Error),

    #[error("failed to read random device {path}: {source}")]
    Device {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub trait SecureRandom: Send + Sync {
    /// Fills `dest` with cryptographically secure random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RandomError`] if the underlying source cannot be read.
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), RandomError>;

    fn name(&self) -> &'static str;
}

/// The operating system CSPRNG. Compiled-in default.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSecureRandom;

impl SecureRandom for OsSecureRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), RandomError> {
        OsRng.try_fill_bytes(dest)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        OS_IMPL
    }
}

/// Reads a random device file such as `/dev/urandom`.
///
/// The file is opened on first use and kept open.
#[derive(Debug)]
pub struct DeviceSecureRandom {
    path: PathBuf,
    reader: Mutex<Option<BufReader<File>>>,
}

impl DeviceSecureRandom {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn device_error(&self, source: io::Error) -> RandomError {
        RandomError::Device {
            path: self.path.clone(),
            source,
        }
    }
}

impl SecureRandom for DeviceSecureRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<(), RandomError> {
        let mut guard = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let mut reader = match guard.take() {
            Some(reader) => reader,
            None => BufReader::new(File::open(&self.path).map_err(|e| self.device_error(e))?),
        };
        // A failed reader is dropped and reopened on next use.
        reader.read_exact(dest).map_err(|e| self.device_error(e))?;
        *guard = Some(reader);
        Ok(())
    }

    fn name(&self) -> &'static str {
        DEVICE_IMPL
    }
}

/// Picks the implementation named by the configuration. Unknown names fall
/// back to [`OsSecureRandom`] with a warning.
pub fn from_config(config: &Config) -> Arc<dyn SecureRandom> {
    match config.secure_random_impl().map(str::trim) {
        None | Some(OS_IMPL) => Arc::new(OsSecureRandom),
        Some(DEVICE_IMPL) => Arc::new(DeviceSecureRandom::new(config.random_device_path())),
        Some(other) => {
            warn!(
                implementation = other,
                fallback = OS_IMPL,
                "Unknown secure random implementation"
            );
            Arc::new(OsSecureRandom)
        }
    }
}
