//! Certificate authority facade shared by the HTTP layer.

use crate::deletion::DeletionCoordinator;
use crate::error::{CaResult, DeletionReport};
use crate::leaf_issuer::{LeafIssuer, LeafRequest};
use crate::registry::{LeafCertificateEntry, RegistryStore};
use crate::root_ca_store::{RootCaInfo, RootCaParams, RootCaStore};
use crate::storage::{Storage, REGISTRY_FILE, ROOT_CERT_DER_FILE, ROOT_CERT_FILE};
use std::path::PathBuf;

/// Name the web UI links the root certificate under.
pub const ROOT_CERT_UI_ALIAS: &str = "root-crt.pem";

/// Everything operating on one storage directory: root CA store, leaf
/// registry, issuance and deletion.
pub struct CertificateAuthority {
    storage: Storage,
    root_ca: RootCaStore,
    registry: RegistryStore,
}

impl CertificateAuthority {
    pub fn new(storage: Storage) -> Self {
        Self {
            root_ca: RootCaStore::new(storage.clone()),
            registry: RegistryStore::new(storage.clone()),
            storage,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn root_ca(&self) -> &RootCaStore {
        &self.root_ca
    }

    pub fn registry(&self) -> &RegistryStore {
        &self.registry
    }

    pub fn root_ca_exists(&self) -> bool {
        self.root_ca.exists()
    }

    pub fn generate_root_ca(&self, params: &RootCaParams, force: bool) -> CaResult<RootCaInfo> {
        self.root_ca.generate(params, force)
    }

    pub fn import_root_ca(&self, private_key_pem: &str, certificate_pem: &str) -> CaResult<()> {
        self.root_ca.import(private_key_pem, certificate_pem)
    }

    pub fn issue_leaf(&self, request: &LeafRequest) -> CaResult<LeafCertificateEntry> {
        LeafIssuer::new(&self.storage, &self.root_ca, &self.registry).issue_leaf(request)
    }

    pub fn delete_leaf(&self, name: &str) -> CaResult<DeletionReport> {
        DeletionCoordinator::new(&self.storage, &self.registry).delete_by_name(name)
    }

    pub fn list_leaves(&self) -> Vec<LeafCertificateEntry> {
        self.registry.list()
    }

    /// Whether `file_name` may be handed out for download: the public root
    /// certificate, the registry document, or a file referenced by an entry.
    /// The root private key never qualifies.
    pub fn is_downloadable(&self, file_name: &str) -> bool {
        let file_name = canonical_download_name(file_name);
        if [ROOT_CERT_FILE, ROOT_CERT_DER_FILE, REGISTRY_FILE].contains(&file_name) {
            return true;
        }
        self.registry
            .list()
            .iter()
            .any(|entry| entry.references(file_name))
    }

    /// Path served for a `/data/<file_name>` request, if any.
    ///
    /// # Returns
    /// * `Some(path)` - the file is downloadable and resolves inside storage
    /// * `None` - anything else, including the root private key
    pub fn resolve_download(&self, file_name: &str) -> Option<PathBuf> {
        if !self.is_downloadable(file_name) {
            return None;
        }
        self.storage
            .resolve_contained(canonical_download_name(file_name))
            .ok()
    }
}

/// Map the browser UI's root certificate link onto the stored file name.
fn canonical_download_name(file_name: &str) -> &str {
    if file_name == ROOT_CERT_UI_ALIAS {
        ROOT_CERT_FILE
    } else {
        file_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CertificateRegistry;
    use crate::storage::ROOT_KEY_FILE;
    use tempfile::TempDir;

    #[test]
    fn test_downloadable_files() {
        let dir = TempDir::new().unwrap();
        let authority = CertificateAuthority::new(Storage::new(dir.path()));
        let mut registry = CertificateRegistry::default();
        registry.certificates.push(LeafCertificateEntry {
            name: "a".to_string(),
            expiry: "2030-01-01".to_string(),
            cert_file: "a.crt.pem".to_string(),
            key_file: "a.key.pem".to_string(),
            chain_file: None,
        });
        authority.registry().save(&registry).unwrap();

        assert!(authority.is_downloadable(ROOT_CERT_FILE));
        assert!(authority.is_downloadable(REGISTRY_FILE));
        assert!(authority.is_downloadable("a.key.pem"));
        assert!(!authority.is_downloadable(ROOT_KEY_FILE));
        assert!(!authority.is_downloadable("a.chain.pem"));
    }

    #[test]
    fn test_root_certificate_ui_alias() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let authority = CertificateAuthority::new(storage.clone());

        assert!(authority.is_downloadable(ROOT_CERT_UI_ALIAS));
        let path = authority.resolve_download(ROOT_CERT_UI_ALIAS).unwrap();
        assert_eq!(path.file_name().unwrap(), ROOT_CERT_FILE);
        assert!(authority.resolve_download(ROOT_KEY_FILE).is_none());
        assert!(authority.resolve_download("../certs.json").is_none());
    }
}
