//! Deletion Coordinator Module
//!
//! Removes a leaf certificate from the registry together with its backing
//! files. Every referenced file is checked for containment in the storage
//! directory before anything is removed; a single unsafe reference aborts the
//! whole deletion. Files already gone are reported as missing, not as errors.
//! The registry entry is dropped only when every file was handled cleanly.

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::{CaError, CaResult, DeletionReport, FileError};
use crate::registry::RegistryStore;
use crate::storage::Storage;

pub struct DeletionCoordinator<'a> {
    storage: &'a Storage,
    registry: &'a RegistryStore,
}

impl<'a> DeletionCoordinator<'a> {
    pub fn new(storage: &'a Storage, registry: &'a RegistryStore) -> Self {
        Self { storage, registry }
    }

    /// Delete the entry named `name` (case-insensitive) and its files.
    ///
    /// # Errors
    /// - `NotFound` when no entry matches; nothing is touched
    /// - `Deletion` with the partial report when a file reference is unsafe or
    ///   a removal fails; the registry entry stays in place
    /// - `Io` when the registry cannot be persisted after the files are gone
    pub fn delete_by_name(&self, name: &str) -> CaResult<DeletionReport> {
        self.registry.transaction(|registry| {
            let entry = registry
                .find_by_name(name)
                .cloned()
                .ok_or_else(|| CaError::NotFound(format!("Certificate '{}' not found", name.trim())))?;

            let mut report = DeletionReport::default();

            let mut resolved: Vec<(String, PathBuf)> = Vec::new();
            for file in entry.files() {
                match self.storage.resolve_contained(file) {
                    Ok(path) => resolved.push((file.to_string(), path)),
                    Err(reason) => report.errors.push(FileError {
                        file: file.to_string(),
                        reason,
                    }),
                }
            }
            if report.has_errors() {
                warn!(name = %entry.name, errors = ?report.errors, "Refusing unsafe deletion");
                return Err(CaError::Deletion {
                    name: entry.name,
                    report,
                });
            }

            for (file, path) in resolved {
                match fs::remove_file(&path) {
                    Ok(()) => report.deleted.push(file),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.missing.push(file),
                    Err(e) => report.errors.push(FileError {
                        file,
                        reason: e.to_string(),
                    }),
                }
            }
            if report.has_errors() {
                warn!(name = %entry.name, errors = ?report.errors, "Deletion partially failed");
                return Err(CaError::Deletion {
                    name: entry.name,
                    report,
                });
            }

            registry.remove_by_name(&entry.name);
            info!(
                name = %entry.name,
                deleted = report.deleted.len(),
                missing = report.missing.len(),
                "Leaf certificate deleted"
            );
            Ok((report, true))
        })
    }
}
