//! Certificate Registry Module
//!
//! Durable record of every issued leaf certificate, persisted as a single JSON
//! document in the storage directory. The registry is the source of truth for
//! which leaf certificates exist, regardless of other files lying around in
//! storage.
//!
//! Mutations are whole-document read-modify-write cycles serialized through an
//! in-process mutex, and every write goes through a temp file and an atomic
//! rename. A missing or corrupt document loads as an empty registry.

use std::fs;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CaError, CaResult};
use crate::storage::{Storage, PUBLIC_FILE_MODE};

pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

/// One issued leaf certificate and the files backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafCertificateEntry {
    pub name: String,
    pub expiry: String,
    pub cert_file: String,
    pub key_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_file: Option<String>,
}

impl LeafCertificateEntry {
    /// Every file this entry references, certificate first.
    pub fn files(&self) -> Vec<&str> {
        let mut files = vec![self.cert_file.as_str(), self.key_file.as_str()];
        if let Some(chain) = &self.chain_file {
            files.push(chain.as_str());
        }
        files
    }

    pub fn references(&self, file_name: &str) -> bool {
        self.files().contains(&file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRegistry {
    #[serde(default = "default_version")]
    pub version: u32,
    pub certificates: Vec<LeafCertificateEntry>,
}

fn default_version() -> u32 {
    REGISTRY_SCHEMA_VERSION
}

impl Default for CertificateRegistry {
    fn default() -> Self {
        Self {
            version: REGISTRY_SCHEMA_VERSION,
            certificates: Vec::new(),
        }
    }
}

/// Registry names are compared trimmed and case-insensitively.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl CertificateRegistry {
    pub fn find_by_name(&self, name: &str) -> Option<&LeafCertificateEntry> {
        let wanted = normalize_name(name);
        self.certificates
            .iter()
            .find(|entry| normalize_name(&entry.name) == wanted)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    /// Remove the entry matching `name`, returning it.
    pub fn remove_by_name(&mut self, name: &str) -> Option<LeafCertificateEntry> {
        let wanted = normalize_name(name);
        let index = self
            .certificates
            .iter()
            .position(|entry| normalize_name(&entry.name) == wanted)?;
        Some(self.certificates.remove(index))
    }
}

/// File-backed repository for [`CertificateRegistry`].
pub struct RegistryStore {
    storage: Storage,
    write_lock: Mutex<()>,
}

impl RegistryStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Read the persisted registry, degrading to empty on absence or corruption.
    pub fn load(&self) -> CertificateRegistry {
        let path = self.storage.registry_path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CertificateRegistry::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Registry unreadable, treating as empty");
                return CertificateRegistry::default();
            }
        };

        match serde_json::from_str::<CertificateRegistry>(&contents) {
            Ok(registry) if registry.version <= REGISTRY_SCHEMA_VERSION => registry,
            Ok(registry) => {
                warn!(
                    version = registry.version,
                    supported = REGISTRY_SCHEMA_VERSION,
                    "Registry schema version not supported, treating as empty"
                );
                CertificateRegistry::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Registry malformed, treating as empty");
                CertificateRegistry::default()
            }
        }
    }

    /// Replace the persisted document with `registry`.
    pub fn save(&self, registry: &CertificateRegistry) -> CaResult<()> {
        let mut json = serde_json::to_vec_pretty(registry)
            .map_err(|e| CaError::io("Failed to serialize registry", e.into()))?;
        json.push(b'\n');
        self.storage
            .stage(&json, PUBLIC_FILE_MODE)?
            .commit(&self.storage.registry_path())
    }

    pub fn list(&self) -> Vec<LeafCertificateEntry> {
        let _guard = self.lock();
        self.load().certificates
    }

    pub fn find_by_name(&self, name: &str) -> Option<LeafCertificateEntry> {
        let _guard = self.lock();
        self.load().find_by_name(name).cloned()
    }

    /// Run one read-modify-write cycle under the registry lock.
    ///
    /// The closure gets the freshly loaded registry and returns its result
    /// together with whether it changed anything. The document is written
    /// only for a successful closure that reports a change.
    pub fn transaction<T, F>(&self, f: F) -> CaResult<T>
    where
        F: FnOnce(&mut CertificateRegistry) -> CaResult<(T, bool)>,
    {
        let _guard = self.lock();
        let mut registry = self.load();
        let (value, changed) = f(&mut registry)?;
        if changed {
            self.save(&registry)?;
        }
        Ok(value)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        // A panic while holding the lock cannot leave a half-written document
        // because saves are atomic renames, so poisoning is ignored.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
