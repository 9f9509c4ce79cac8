//! Cipher suites understood by downstream codecs.

use std::fmt;

use serde::Serialize;

/// Smallest buffer a crypto stream may be configured with.
pub const MIN_BUFFER_SIZE: usize = 512;

/// Thrown to indicate that the requested codec or cipher suite is not
/// supported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported codec: {0}")]
pub struct UnsupportedCodecError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CipherSuite {
    AesCtrNoPadding,
}

impl CipherSuite {
    pub const ALL: [CipherSuite; 1] = [Self::AesCtrNoPadding];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AesCtrNoPadding => "AES/CTR/NoPadding",
        }
    }

    #[must_use]
    pub fn algorithm_block_size(self) -> usize {
        match self {
            Self::AesCtrNoPadding => 16,
        }
    }

    /// Suffix appended to
    /// [`CRYPTO_CODEC_CLASSES_PREFIX`](crate::config::keys::CRYPTO_CODEC_CLASSES_PREFIX).
    #[must_use]
    pub fn config_suffix(self) -> &'static str {
        match self {
            Self::AesCtrNoPadding => ".aes.ctr.nopadding",
        }
    }

    /// Parses a suite by its canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedCodecError`] for any other name.
    pub fn convert(name: &str) -> Result<Self, UnsupportedCodecError> {
        Self::ALL
            .into_iter()
            .find(|suite| suite.name() == name)
            .ok_or_else(|| UnsupportedCodecError(format!("invalid cipher suite name: {name}")))
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// AES/CTR/NoPadding is required.
///
/// # Errors
///
/// Returns [`UnsupportedCodecError`] for any other suite.
pub fn check_codec(suite: CipherSuite) -> Result<(), UnsupportedCodecError> {
    match suite {
        CipherSuite::AesCtrNoPadding => Ok(()),
    }
}

/// Checks the minimum and floors `buffer_size` to a whole number of cipher
/// blocks.
///
/// # Errors
///
/// Returns [`UnsupportedCodecError`] when `buffer_size` is below
/// [`MIN_BUFFER_SIZE`].
pub fn check_buffer_size(
    suite: CipherSuite,
    buffer_size: usize,
) -> Result<usize, UnsupportedCodecError> {
    if buffer_size < MIN_BUFFER_SIZE {
        return Err(UnsupportedCodecError(format!(
            "minimum value of buffer size is {MIN_BUFFER_SIZE}"
        )));
    }
    Ok(buffer_size - buffer_size % suite.algorithm_block_size())
}
