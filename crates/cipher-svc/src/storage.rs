//! On-disk layout for uploads and produced files.
//!
//! ```text
//! <data_dir>/uploads/   raw uploads (only when KEEP_UPLOADS is set)
//! <data_dir>/encrypt/   tokens produced by POST /encrypt
//! <data_dir>/decrypt/   plaintext produced by POST /decrypt
//! ```
//!
//! Every user-supplied name passes through [`sanitize_filename`] before it is
//! joined onto a directory.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use tempfile::NamedTempFile;
use thiserror::Error;

/// Suffix appended to encrypted outputs.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Suffix appended to decrypted outputs whose input had no [`ENCRYPTED_SUFFIX`].
pub const DECRYPTED_SUFFIX: &str = ".dec";

/// Device names Windows treats specially regardless of extension.
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A filesystem operation failed.
    #[error("storage i/o failed: {0}")]
    Io(#[from] io::Error),

    /// The supplied name is empty after sanitisation or was altered by it.
    #[error("unsafe filename")]
    UnsafeFilename,

    /// The download folder is not one of the output folders.
    #[error("invalid folder: {0}")]
    UnknownFolder(String),

    /// The requested output does not exist.
    #[error("file not found: {0}")]
    NotFound(String),
}

/// Output folder that downloads may be served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folder {
    Encrypt,
    Decrypt,
}

impl Folder {
    fn dir_name(self) -> &'static str {
        match self {
            Folder::Encrypt => "encrypt",
            Folder::Decrypt => "decrypt",
        }
    }
}

impl FromStr for Folder {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encrypt" => Ok(Folder::Encrypt),
            "decrypt" => Ok(Folder::Decrypt),
            other => Err(StorageError::UnknownFolder(other.to_owned())),
        }
    }
}

/// Directory handle for uploads and outputs.
#[derive(Debug)]
pub struct FileStorage {
    uploads: PathBuf,
    encrypt: PathBuf,
    decrypt: PathBuf,
    keep_uploads: bool,
}

impl FileStorage {
    /// Create the directory layout under `data_dir` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if a directory cannot be created.
    pub fn init(data_dir: impl AsRef<Path>, keep_uploads: bool) -> Result<Self, StorageError> {
        let root = data_dir.as_ref();
        let storage = Self {
            uploads: root.join("uploads"),
            encrypt: root.join(Folder::Encrypt.dir_name()),
            decrypt: root.join(Folder::Decrypt.dir_name()),
            keep_uploads,
        };
        for dir in [&storage.uploads, &storage.encrypt, &storage.decrypt] {
            fs::create_dir_all(dir)?;
        }
        Ok(storage)
    }

    /// `true` if every directory still exists.
    pub fn is_ready(&self) -> bool {
        [&self.uploads, &self.encrypt, &self.decrypt]
            .iter()
            .all(|d| d.is_dir())
    }

    fn dir(&self, folder: Folder) -> &Path {
        match folder {
            Folder::Encrypt => &self.encrypt,
            Folder::Decrypt => &self.decrypt,
        }
    }

    /// Keep a copy of the raw upload. No-op unless uploads are kept.
    ///
    /// `name` must already be sanitised.
    pub fn save_upload(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        if !self.keep_uploads {
            return Ok(());
        }
        write_atomic(&self.uploads, name, data)?;
        Ok(())
    }

    /// Write an output file, replacing any previous output with the same name.
    ///
    /// `name` must already be sanitised.
    pub fn write_output(
        &self,
        folder: Folder,
        name: &str,
        data: &[u8],
    ) -> Result<PathBuf, StorageError> {
        write_atomic(self.dir(folder), name, data)
    }

    /// Resolve a download request to an existing output file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsafeFilename`] if `name` is not already in
    /// sanitised form and [`StorageError::NotFound`] if no such file exists.
    pub fn resolve_download(&self, folder: Folder, name: &str) -> Result<PathBuf, StorageError> {
        if sanitize_filename(name).as_deref() != Some(name) {
            return Err(StorageError::UnsafeFilename);
        }
        let path = self.dir(folder).join(name);
        if !path.is_file() {
            return Err(StorageError::NotFound(name.to_owned()));
        }
        Ok(path)
    }
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Path separators become spaces, whitespace runs become `_`, and only ASCII
/// letters, digits, `_`, `.` and `-` are kept. Leading and trailing `.`/`_`
/// are stripped, so `../../etc/passwd` becomes `etc_passwd`. Returns `None`
/// if nothing usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return None;
    }

    let stem = trimmed.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|d| d.eq_ignore_ascii_case(stem))
    {
        return Some(format!("_{trimmed}"));
    }
    Some(trimmed.to_owned())
}

/// Output name for an encrypted upload.
pub fn encrypted_name(name: &str) -> String {
    format!("{name}{ENCRYPTED_SUFFIX}")
}

/// Output name for a decrypted upload: drop `.enc`, or append `.dec`.
pub fn decrypted_name(name: &str) -> String {
    match name.strip_suffix(ENCRYPTED_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem.to_owned(),
        _ => format!("{name}{DECRYPTED_SUFFIX}"),
    }
}

fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
    let path = dir.join(name);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;
    Ok(path)
}
