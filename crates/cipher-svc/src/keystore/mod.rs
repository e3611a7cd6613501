//! Service key lifecycle: generate once, persist, reload on every start.
//!
//! # Lifecycle
//!
//! 1. At startup, [`load_or_create`] reads the key file if it exists.
//! 2. Otherwise a fresh key is drawn from the OS CSPRNG, written to a temp
//!    file beside the target, and linked into place with
//!    [`tempfile::NamedTempFile::persist_noclobber`]. The key file is therefore
//!    either absent or complete, never partial.
//! 3. If another process links its key first, ours is discarded and the
//!    winner's file is loaded, so every process converges on one key.
//!
//! # Security invariants
//!
//! - An existing key file is never overwritten or deleted.
//! - The key is never logged; only [`KeyBytes::key_id`] may appear in logs.
//! - New key files are created with mode `0600` on Unix.

pub mod key;

pub use key::KeyBytes;

use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::KEY_LEN;

/// Errors produced by the key store.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// The key file (or its directory) could not be read or written.
    #[error("key file {} is not accessible: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The stored key does not have the length the cipher requires.
    #[error("key file {} has invalid length: expected {KEY_LEN} bytes, got {len}", .path.display())]
    Format { path: PathBuf, len: usize },
}

/// How the key returned by [`load_or_create`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// An existing key file was read.
    Loaded,
    /// This call generated and persisted a new key.
    Created,
}

/// Return the key stored at `path`, creating it on first use.
///
/// # Errors
///
/// Returns [`KeyStoreError::Format`] if an existing file is not exactly
/// [`KEY_LEN`] bytes, and [`KeyStoreError::Io`] for any filesystem failure.
pub fn load_or_create(path: &Path) -> Result<(KeyBytes, KeyOrigin), KeyStoreError> {
    match read_key(path) {
        Ok(key) => return Ok((key, KeyOrigin::Loaded)),
        Err(KeyStoreError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    create_key(path)
}

fn read_key(path: &Path) -> Result<KeyBytes, KeyStoreError> {
    let bytes = Zeroizing::new(fs::read(path).map_err(|e| io_err(path, e))?);
    KeyBytes::from_slice(&bytes).ok_or(KeyStoreError::Format {
        path: path.to_owned(),
        len: bytes.len(),
    })
}

fn create_key(path: &Path) -> Result<(KeyBytes, KeyOrigin), KeyStoreError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;

    let key = KeyBytes::generate();

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| io_err(parent, e))?;
    restrict_permissions(tmp.as_file()).map_err(|e| io_err(tmp.path(), e))?;
    tmp.write_all(key.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| io_err(tmp.path(), e))?;

    match tmp.persist_noclobber(path) {
        Ok(_) => Ok((key, KeyOrigin::Created)),
        // Lost the first-run race: adopt the winner's key.
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            read_key(path).map(|k| (k, KeyOrigin::Loaded))
        }
        Err(e) => Err(io_err(path, e.error)),
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}

fn io_err(path: &Path, source: io::Error) -> KeyStoreError {
    KeyStoreError::Io {
        path: path.to_owned(),
        source,
    }
}
