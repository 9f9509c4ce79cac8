//! Layered configuration for the native loader and its consumers.
//!
//! Values are looked up by dotted key (see [`keys`]). Three layers are
//! consulted, highest priority first:
//!
//! 1. Programmatic overrides set with [`Config::with`]
//! 2. Process environment: `cryptostream.lib.path` is read from
//!    `CRYPTOSTREAM_LIB_PATH`
//! 3. The bundled properties resource [`PROPERTIES_RESOURCE`], applied only to
//!    keys that are otherwise unset and only for keys in the `cryptostream.`
//!    namespace
//!
//! Empty values are treated as unset in every layer.
//!
//! # Example
//!
//! ```
//! use cryptostream::{Config, config::keys};
//!
//! let config = Config::empty().with(keys::LIB_NAME, "libcustom.so");
//! assert_eq!(config.lib_name(), Some("libcustom.so"));
//! assert_eq!(config.buffer_size().unwrap(), 8192);
//! ```

use std::{
    collections::HashMap,
    io::Read,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    cipher::{CipherSuite, UnsupportedCodecError},
    resource::ResourceProvider,
};

/// Name of the bundled properties resource.
pub const PROPERTIES_RESOURCE: &str = "cryptostream.properties";

/// Only keys with this prefix are taken from the bundled properties.
const KEY_NAMESPACE: &str = "cryptostream.";

/// Configuration keys.
pub mod keys {
    /// Directory holding a pre-placed native library.
    pub const LIB_PATH: &str = "cryptostream.lib.path";
    /// Exact file name of the native library.
    pub const LIB_NAME: &str = "cryptostream.lib.name";
    /// Expected SHA-256 (hex) of the library found through [`LIB_PATH`].
    pub const LIB_CHECKSUM: &str = "cryptostream.lib.checksum";
    /// Directory native libraries are extracted into.
    pub const TEMPDIR: &str = "cryptostream.tempdir";
    pub const CRYPTO_BUFFER_SIZE: &str = "cryptostream.crypto.buffer.size";
    pub const CRYPTO_CIPHER_SUITE: &str = "cryptostream.crypto.cipher.suite";
    /// Prefix; the cipher suite's config suffix is appended.
    pub const CRYPTO_CODEC_CLASSES_PREFIX: &str = "cryptostream.crypto.codec.classes";
    pub const SECURE_RANDOM_IMPL: &str = "cryptostream.secure.random.impl";
    pub const RANDOM_DEVICE_FILE_PATH: &str = "cryptostream.random.device.file.path";

    /// Every fixed key, used when reading the process environment.
    pub const ALL: &[&str] = &[
        LIB_PATH,
        LIB_NAME,
        LIB_CHECKSUM,
        TEMPDIR,
        CRYPTO_BUFFER_SIZE,
        CRYPTO_CIPHER_SUITE,
        SECURE_RANDOM_IMPL,
        RANDOM_DEVICE_FILE_PATH,
    ];
}

pub const CRYPTO_BUFFER_SIZE_DEFAULT: usize = 8192;
pub const CRYPTO_CIPHER_SUITE_DEFAULT: &str = "AES/CTR/NoPadding";
pub const RANDOM_DEVICE_FILE_PATH_DEFAULT: &str = "/dev/urandom";

/// Errors raised when a configured value cannot be interpreted.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A value is present but malformed.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// The configured cipher suite is not supported.
    #[error(transparent)]
    UnsupportedCodec(#[from] UnsupportedCodecError),
}

/// Resolved configuration values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    values: HashMap<String, String>,
}

impl Config {
    /// Creates a configuration with nothing set; every accessor returns its
    /// default.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the environment layer and the bundled properties from
    /// `resources`.
    ///
    /// Failure to read the properties resource is logged and otherwise
    /// ignored.
    pub fn load(resources: &dyn ResourceProvider) -> Self {
        let mut config = Self::from_env();
        match read_properties(resources) {
            Ok(Some(text)) => config.apply_properties(&text),
            Ok(None) => debug!(resource = PROPERTIES_RESOURCE, "No bundled properties"),
            Err(e) => warn!(
                resource = PROPERTIES_RESOURCE,
                error = %e,
                "Could not load bundled properties"
            ),
        }
        config
    }

    /// Reads every key in [`keys::ALL`] from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the environment layer from an arbitrary variable lookup.
    ///
    /// Reads every key in [`keys::ALL`] and the codec-classes key of every
    /// [`CipherSuite`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let codec_keys = CipherSuite::ALL.map(codec_classes_key);
        let mut config = Self::empty();
        for key in keys::ALL
            .iter()
            .copied()
            .chain(codec_keys.iter().map(String::as_str))
        {
            if let Some(value) = lookup(&env_var_name(key)) {
                config.set(key, value);
            }
        }
        config
    }

    /// Sets `key`, replacing any value from a lower layer.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_string(), value);
        }
    }

    /// Applies `key=value` pairs from properties text to keys that are
    /// still unset.
    pub fn apply_properties(&mut self, text: &str) {
        for (key, value) in parse_properties(text) {
            if key.starts_with(KEY_NAMESPACE)
                && !self.values.contains_key(&key)
                && !value.is_empty()
            {
                self.values.insert(key, value);
            }
        }
    }

    /// Returns the raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn lib_path(&self) -> Option<&Path> {
        self.get(keys::LIB_PATH).map(Path::new)
    }

    #[must_use]
    pub fn lib_name(&self) -> Option<&str> {
        self.get(keys::LIB_NAME)
    }

    #[must_use]
    pub fn lib_checksum(&self) -> Option<&str> {
        self.get(keys::LIB_CHECKSUM).map(str::trim)
    }

    /// Directory native libraries are extracted into, made absolute.
    ///
    /// Defaults to the host temp directory.
    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        let dir = self
            .get(keys::TEMPDIR)
            .map_or_else(std::env::temp_dir, PathBuf::from);
        std::path::absolute(&dir).unwrap_or(dir)
    }

    /// Buffer size for downstream crypto streams.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the value is not a positive
    /// integer.
    pub fn buffer_size(&self) -> Result<usize, ConfigError> {
        let Some(raw) = self.get(keys::CRYPTO_BUFFER_SIZE) else {
            return Ok(CRYPTO_BUFFER_SIZE_DEFAULT);
        };
        match raw.trim().parse::<usize>() {
            Ok(size) if size > 0 => Ok(size),
            Ok(_) => Err(invalid(keys::CRYPTO_BUFFER_SIZE, raw, "must be positive")),
            Err(e) => Err(invalid(keys::CRYPTO_BUFFER_SIZE, raw, &e.to_string())),
        }
    }

    #[must_use]
    pub fn cipher_suite_name(&self) -> &str {
        self.get(keys::CRYPTO_CIPHER_SUITE)
            .unwrap_or(CRYPTO_CIPHER_SUITE_DEFAULT)
    }

    /// Cipher suite for downstream codecs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedCodec`] for unknown suite names.
    pub fn cipher_suite(&self) -> Result<CipherSuite, ConfigError> {
        Ok(CipherSuite::convert(self.cipher_suite_name())?)
    }

    /// Codec implementation list configured for `suite`, if any.
    #[must_use]
    pub fn codec_classes(&self, suite: CipherSuite) -> Option<&str> {
        self.get(&codec_classes_key(suite))
    }

    #[must_use]
    pub fn secure_random_impl(&self) -> Option<&str> {
        self.get(keys::SECURE_RANDOM_IMPL)
    }

    #[must_use]
    pub fn random_device_path(&self) -> &Path {
        Path::new(
            self.get(keys::RANDOM_DEVICE_FILE_PATH)
                .unwrap_or(RANDOM_DEVICE_FILE_PATH_DEFAULT),
        )
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// `cryptostream.crypto.codec.classes.aes.ctr.nopadding` for AES/CTR.
#[must_use]
pub fn codec_classes_key(suite: CipherSuite) -> String {
    format!("{}{}", keys::CRYPTO_CODEC_CLASSES_PREFIX, suite.config_suffix())
}

/// `cryptostream.lib.path` -> `CRYPTOSTREAM_LIB_PATH`.
#[must_use]
pub fn env_var_name(key: &str) -> String {
    key.to_ascii_uppercase().replace('.', "_")
}

fn read_properties(resources: &dyn ResourceProvider) -> std::io::Result<Option<String>> {
    if !resources.contains(PROPERTIES_RESOURCE) {
        return Ok(None);
    }
    let mut text = String::new();
    resources
        .open(PROPERTIES_RESOURCE)?
        .read_to_string(&mut text)?;
    Ok(Some(text))
}

/// Parses `key=value` / `key: value` lines.
///
/// Blank lines and lines starting with `#` or `!` are skipped. A line with
/// no separator yields the whole line as key with an empty value.
#[must_use]
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| match line.find(['=', ':']) {
            Some(at) => (
                line[..at].trim().to_string(),
                line[at + 1..].trim().to_string(),
            ),
            None => (line.to_string(), String::new()),
        })
        .collect()
}
