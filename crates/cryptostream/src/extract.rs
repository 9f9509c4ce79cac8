//! Extraction of a bundled native library to a loadable file.
//!
//! The copy is streamed in [`CHUNK_SIZE`] chunks, then both the resource and
//! the written file are re-read and compared before the artifact is handed
//! back. A mismatch deletes the file; a caller never sees a path whose
//! contents differ from the bundled bytes.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{random::SecureRandom, resource::ResourceProvider};

pub const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub logical_name: String,
    /// Resource folder, e.g. `cryptostream/native/Linux/x86_64`.
    pub source_folder: String,
    pub library_file_name: String,
    pub target_folder: PathBuf,
}

impl ExtractionRequest {
    #[must_use]
    pub fn resource_path(&self) -> String {
        format!("{}/{}", self.source_folder, self.library_file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedArtifact {
    pub file_path: PathBuf,
    pub uuid: Uuid,
    pub version: String,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExtractError {
    #[error("bundled resource not found: {0}")]
    ResourceMissing(String),

    #[error("failed to generate an extraction id: {0}")]
    Random(#[from] crate::random::RandomError),

    #[error("failed to write a native library file at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write a native library file at {}: contents differ from {resource}", .path.display())]
    Mismatch { path: PathBuf, resource: String },
}

impl ExtractError {
    /// The destination file involved, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } | Self::Mismatch { path, .. } => Some(path.as_path()),
            Self::ResourceMissing(_) | Self::Random(_) => None,
        }
    }
}

/// `{logical}-{version}-{uuid}-{file}`.
#[must_use]
pub fn extracted_file_name(
    logical_name: &str,
    version: &str,
    uuid: &str,
    library_file_name: &str,
) -> String {
    format!("{logical_name}-{version}-{uuid}-{library_file_name}")
}

fn new_uuid(random: &dyn SecureRandom) -> Result<Uuid, ExtractError> {
    let mut bytes = [0u8; 16];
    random.fill_bytes(&mut bytes)?;
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

/// Copies the requested resource into the target folder and verifies it.
///
/// # Errors
///
/// Returns [`ExtractError`] if the resource is missing, the copy fails, or
/// the written file does not match the resource byte for byte.
pub fn extract(
    resources: &dyn ResourceProvider,
    request: &ExtractionRequest,
    version: &str,
    random: &dyn SecureRandom,
) -> Result<ExtractedArtifact, ExtractError> {
    let resource = request.resource_path();
    if !resources.contains(&resource) {
        return Err(ExtractError::ResourceMissing(resource));
    }

    let uuid = new_uuid(random)?;
    let file_name = extracted_file_name(
        &request.logical_name,
        version,
        &uuid.to_string(),
        &request.library_file_name,
    );
    let path = request.target_folder.join(file_name);
    let io_err = |source| ExtractError::Io {
        path: path.clone(),
        source,
    };

    debug!(resource = %resource, path = %path.display(), "Extracting native library");

    if let Err(e) = copy_resource(resources, &resource, &path) {
        // An existing file belongs to someone else.
        if e.kind() != io::ErrorKind::AlreadyExists {
            discard(&path);
        }
        return Err(io_err(e));
    }

    match contents_equal(resources, &resource, &path) {
        Ok(true) => {}
        Ok(false) => {
            discard(&path);
            return Err(ExtractError::Mismatch {
                path: path.clone(),
                resource,
            });
        }
        Err(e) => {
            discard(&path);
            return Err(io_err(e));
        }
    }

    if let Err(e) = make_loadable(&path) {
        discard(&path);
        return Err(io_err(e));
    }

    Ok(ExtractedArtifact {
        file_path: path,
        uuid,
        version: version.to_string(),
    })
}

/// The destination is created exclusively; an existing file is an error,
/// never overwritten.
fn copy_resource(resources: &dyn ResourceProvider, resource: &str, path: &Path) -> io::Result<()> {
    let mut reader = resources.open(resource)?;
    let mut writer = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..n])?;
    }
    writer.flush()
}

fn contents_equal(resources: &dyn ResourceProvider, resource: &str, path: &Path) -> io::Result<bool> {
    let mut original = resources.open(resource)?;
    let mut extracted = File::open(path)?;
    let mut left = [0u8; CHUNK_SIZE];
    let mut right = [0u8; CHUNK_SIZE];
    loop {
        let n = read_full(&mut original, &mut left)?;
        let m = read_full(&mut extracted, &mut right)?;
        if n != m || left[..n] != right[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

/// Reads until `buf` is full or the reader is exhausted.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(unix)]
fn make_loadable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_loadable(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        debug!(path = %path.display(), error = %e, "Could not remove rejected extraction");
    }
}
