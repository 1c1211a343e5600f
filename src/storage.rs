//! Storage Directory Module
//!
//! Owns the on-disk layout of the certificate authority. Every artifact lives
//! directly inside one directory:
//!
//! ```text
//! root.key.pem    root.crt.pem    root.crt.der    certs.json
//! <stem>.key.pem  <stem>.crt.pem  <stem>.chain.pem
//! ```
//!
//! Writes are staged as temp files in the same directory with their final
//! permissions already set, then renamed into place. Private keys get `0600`,
//! everything else `0644`, and the directory itself `0700`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{CaError, CaResult};

pub const ROOT_KEY_FILE: &str = "root.key.pem";
pub const ROOT_CERT_FILE: &str = "root.crt.pem";
pub const ROOT_CERT_DER_FILE: &str = "root.crt.der";
pub const REGISTRY_FILE: &str = "certs.json";

pub const PRIVATE_FILE_MODE: u32 = 0o600;
pub const PUBLIC_FILE_MODE: u32 = 0o644;
const DIRECTORY_MODE: u32 = 0o700;

/// Layout of the managed storage directory.
///
/// Every artifact the CA produces lives directly inside `root`; entries in the
/// registry refer to files by bare name relative to it.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Storage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn root_key_path(&self) -> PathBuf {
        self.root.join(ROOT_KEY_FILE)
    }

    pub fn root_cert_path(&self) -> PathBuf {
        self.root.join(ROOT_CERT_FILE)
    }

    pub fn root_cert_der_path(&self) -> PathBuf {
        self.root.join(ROOT_CERT_DER_FILE)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Create the storage directory (owner-only) if it does not exist yet.
    pub fn ensure_dir(&self) -> CaResult<()> {
        if self.root.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(&self.root).map_err(|e| {
            CaError::io(
                format!("Failed to create storage directory {}", self.root.display()),
                e,
            )
        })?;
        set_mode(&self.root, DIRECTORY_MODE)
    }

    /// Write `contents` to a temp file inside the storage directory with the
    /// final permissions already applied. Nothing is visible under a real name
    /// until the returned file is committed.
    pub fn stage(&self, contents: &[u8], mode: u32) -> CaResult<StagedFile> {
        self.ensure_dir()?;
        let mut temp = NamedTempFile::new_in(&self.root)
            .map_err(|e| CaError::io("Failed to create temp file in storage directory", e))?;
        temp.write_all(contents)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| CaError::io("Failed to write temp file", e))?;
        set_mode(temp.path(), mode)?;
        Ok(StagedFile { temp })
    }

    /// Resolve `file_name` and verify it lands strictly inside the storage
    /// directory after canonicalization. Works for files that do not exist
    /// yet by canonicalizing their parent.
    pub fn resolve_contained(&self, file_name: &str) -> Result<PathBuf, String> {
        let candidate = self.root.join(file_name);
        let name = candidate
            .file_name()
            .ok_or_else(|| "reference has no file name".to_string())?
            .to_owned();

        let root = self
            .root
            .canonicalize()
            .map_err(|e| format!("cannot resolve storage directory: {}", e))?;

        let resolved = if candidate.exists() {
            candidate
                .canonicalize()
                .map_err(|e| format!("cannot resolve path: {}", e))?
        } else {
            let parent = candidate
                .parent()
                .ok_or_else(|| "reference has no parent directory".to_string())?;
            parent
                .canonicalize()
                .map_err(|e| format!("cannot resolve parent directory: {}", e))?
                .join(name)
        };

        if resolved.starts_with(&root) && resolved != root {
            Ok(resolved)
        } else {
            Err("path resolves outside the storage directory".to_string())
        }
    }
}

/// A fully written temp file waiting to be renamed into place.
/// Dropping it without committing removes it.
pub struct StagedFile {
    temp: NamedTempFile,
}

impl StagedFile {
    /// Atomically replace `target` with the staged contents.
    pub fn commit(self, target: &Path) -> CaResult<()> {
        self.temp
            .persist(target)
            .map(|_| ())
            .map_err(|e| CaError::io(format!("Failed to persist {}", target.display()), e.error))
    }

    /// Rename into `target` only if nothing exists there yet.
    pub fn commit_new(self, target: &Path) -> CaResult<()> {
        self.temp
            .persist_noclobber(target)
            .map(|_| ())
            .map_err(|e| CaError::io(format!("Failed to persist {}", target.display()), e.error))
    }
}

/// Remove `path`, ignoring a file that is already gone. Used to unwind
/// partially committed operations.
pub(crate) fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file during cleanup");
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> CaResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| CaError::io(format!("Failed to set permissions on {}", path.display()), e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> CaResult<()> {
    Ok(())
}
