//! Leaf Issuer Module
//!
//! Issues end-entity certificates signed by the root CA and records them in
//! the registry. Each issuance produces three artifacts in the storage
//! directory, sharing one unique stem:
//!
//! ```text
//! <stem>.key.pem    leaf private key (0600)
//! <stem>.crt.pem    leaf certificate
//! <stem>.chain.pem  leaf certificate followed by the root certificate
//! ```
//!
//! The registry lock is held from the duplicate-name check until the new entry
//! is persisted. Any failure before that point removes every file written for
//! the attempt.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{CaError, CaResult};
use crate::generate_leaf_cert::RsaLeafCertBuilder;
use crate::generate_root_ca::{validate_key_size, validate_validity_days};
use crate::registry::{LeafCertificateEntry, RegistryStore};
use crate::root_ca_store::RootCaStore;
use crate::storage::{remove_quietly, Storage, PRIVATE_FILE_MODE, PUBLIC_FILE_MODE};
use crate::subject_alt_name::build_san_list;

const DEFAULT_BASE_NAME: &str = "cert";

/// Operator input for one leaf certificate.
#[derive(Debug, Clone)]
pub struct LeafRequest {
    pub common_name: String,
    /// Comma-separated additional DNS names and IPv4 addresses.
    pub sans: String,
    pub validity_days: u32,
    pub key_size: u32,
}

pub struct LeafIssuer<'a> {
    storage: &'a Storage,
    root_ca: &'a RootCaStore,
    registry: &'a RegistryStore,
}

impl<'a> LeafIssuer<'a> {
    pub fn new(storage: &'a Storage, root_ca: &'a RootCaStore, registry: &'a RegistryStore) -> Self {
        Self {
            storage,
            root_ca,
            registry,
        }
    }

    pub fn issue_leaf(&self, request: &LeafRequest) -> CaResult<LeafCertificateEntry> {
        self.issue_leaf_at(request, Utc::now())
    }

    /// Issue a leaf whose registry expiry is computed from `issued_at`.
    pub fn issue_leaf_at(
        &self,
        request: &LeafRequest,
        issued_at: DateTime<Utc>,
    ) -> CaResult<LeafCertificateEntry> {
        validate_validity_days(request.validity_days)?;
        validate_key_size(request.key_size)?;
        let common_name = request.common_name.trim();
        if common_name.is_empty() {
            return Err(CaError::Validation("commonName is required".to_string()));
        }
        let san_list = build_san_list(common_name, &request.sans)?;

        if !self.root_ca.exists() {
            return Err(CaError::Precondition(
                "No root CA available. Generate or import a root CA first".to_string(),
            ));
        }

        let mut written = WrittenFiles::default();
        let result = self.registry.transaction(|registry| {
            if registry.contains(common_name) {
                return Err(CaError::Conflict(format!(
                    "A certificate named '{}' already exists",
                    common_name
                )));
            }

            let signer = self.root_ca.load_signer()?;
            let (leaf_key, leaf_cert) =
                RsaLeafCertBuilder::new(&signer.private_key, &signer.certificate)
                    .subject_common_name(common_name.to_string())
                    .subject_alt_names(san_list)
                    .validity_days(request.validity_days)
                    .key_size(request.key_size)
                    .build()?;
            let key_pem = leaf_key.private_key_to_pem_pkcs8()?;
            let cert_pem = leaf_cert.to_pem()?;

            let stem = self.reserve_stem(&file_base_name(common_name));
            let cert_file = format!("{}.crt.pem", stem);
            let key_file = format!("{}.key.pem", stem);
            let chain_file = format!("{}.chain.pem", stem);

            self.write_new(&key_file, &key_pem, PRIVATE_FILE_MODE, &mut written)?;
            self.write_new(&cert_file, &cert_pem, PUBLIC_FILE_MODE, &mut written)?;

            let mut chain = cert_pem.clone();
            chain.extend_from_slice(signer.certificate_pem.as_bytes());
            let chain_file =
                match self.write_new(&chain_file, &chain, PUBLIC_FILE_MODE, &mut written) {
                    Ok(()) => Some(chain_file),
                    Err(e) => {
                        warn!(name = %common_name, error = %e, "Full chain not written");
                        None
                    }
                };

            let entry = LeafCertificateEntry {
                name: common_name.to_string(),
                expiry: expiry_date(issued_at, request.validity_days),
                cert_file,
                key_file,
                chain_file,
            };
            registry.certificates.push(entry.clone());
            Ok((entry, true))
        });

        match result {
            Ok(entry) => {
                written.keep();
                info!(
                    name = %entry.name,
                    expiry = %entry.expiry,
                    cert_file = %entry.cert_file,
                    "Leaf certificate issued"
                );
                Ok(entry)
            }
            Err(e) => Err(e),
        }
    }

    /// First stem (`base`, `base-1`, `base-2`, ...) for which none of the
    /// three artifact files exists on disk.
    fn reserve_stem(&self, base: &str) -> String {
        let taken = |stem: &str| {
            ["crt.pem", "key.pem", "chain.pem"]
                .iter()
                .any(|ext| self.storage.file_path(&format!("{}.{}", stem, ext)).exists())
        };
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}-{}", base, n))
            .find(|stem| !taken(stem))
            .unwrap_or_else(|| base.to_string())
    }

    fn write_new(
        &self,
        file_name: &str,
        contents: &[u8],
        mode: u32,
        written: &mut WrittenFiles,
    ) -> CaResult<()> {
        let target = self.storage.file_path(file_name);
        self.storage.stage(contents, mode)?.commit_new(&target)?;
        written.push(target);
        Ok(())
    }
}

/// Lower-case `common_name` and keep only `[a-z0-9]`.
pub fn file_base_name(common_name: &str) -> String {
    let base: String = common_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    if base.is_empty() {
        DEFAULT_BASE_NAME.to_string()
    } else {
        base
    }
}

/// Calendar date `days` after `issued_at`, as `YYYY-MM-DD` (UTC).
pub fn expiry_date(issued_at: DateTime<Utc>, days: u32) -> String {
    (issued_at + chrono::Duration::days(i64::from(days)))
        .format("%Y-%m-%d")
        .to_string()
}

/// Files committed during one issuance attempt; removed on drop unless kept.
#[derive(Default)]
struct WrittenFiles {
    paths: Vec<PathBuf>,
}

impl WrittenFiles {
    fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn keep(&mut self) {
        self.paths.clear();
    }
}

impl Drop for WrittenFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            remove_quietly(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_base_name() {
        assert_eq!(file_base_name("Example.com"), "examplecom");
        assert_eq!(file_base_name("api-1.internal"), "api1internal");
        assert_eq!(file_base_name("*.*"), "cert");
        assert_eq!(file_base_name("Über"), "ber");
    }

    #[test]
    fn test_expiry_date_is_deterministic() {
        let issued_at = Utc.with_ymd_and_hms(2024, 2, 28, 23, 30, 0).unwrap();
        assert_eq!(expiry_date(issued_at, 1), "2024-02-29");
        assert_eq!(expiry_date(issued_at, 366), "2025-02-28");
        assert_eq!(expiry_date(issued_at, 1), expiry_date(issued_at, 1));
    }

    #[test]
    fn test_reserve_stem_skips_stray_files() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let root_ca = RootCaStore::new(storage.clone());
        let registry = RegistryStore::new(storage.clone());
        let issuer = LeafIssuer::new(&storage, &root_ca, &registry);

        assert_eq!(issuer.reserve_stem("web"), "web");
        fs::write(storage.file_path("web.chain.pem"), b"stray").unwrap();
        assert_eq!(issuer.reserve_stem("web"), "web-1");
        fs::write(storage.file_path("web-1.key.pem"), b"stray").unwrap();
        assert_eq!(issuer.reserve_stem("web"), "web-2");
    }

    #[test]
    fn test_written_files_cleanup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.key.pem");
        fs::write(&path, b"x").unwrap();
        {
            let mut written = WrittenFiles::default();
            written.push(path.clone());
        }
        assert!(!path.exists());

        fs::write(&path, b"x").unwrap();
        {
            let mut written = WrittenFiles::default();
            written.push(path.clone());
            written.keep();
        }
        assert!(path.exists());
    }
}
