//! Root CA Store Module
//!
//! Owns the root key pair on disk: presence checks, generation, import and
//! loading the pair back for signing.
//!
//! Key, certificate and DER copy are staged as temp files and then renamed into
//! place one after the other. If a rename fails, the files already renamed are
//! removed again, so [`RootCaStore::exists`] never sees a key without a
//! certificate (or the reverse).

use std::fs;
use std::path::PathBuf;

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use serde::Serialize;
use tracing::info;

use crate::error::{CaError, CaResult};
use crate::generate_root_ca::{RsaRootCABuilder, SignatureAlgorithm};
use crate::pem_codec;
use crate::storage::{remove_quietly, Storage, PRIVATE_FILE_MODE, PUBLIC_FILE_MODE};

/// Parameters for [`RootCaStore::generate`].
#[derive(Debug, Clone)]
pub struct RootCaParams {
    pub common_name: String,
    pub validity_days: u32,
    pub key_size: u32,
    pub algorithm: SignatureAlgorithm,
}

/// Identity metadata of a freshly generated root CA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCaInfo {
    pub common_name: String,
    pub days: u32,
    pub key_size: u32,
    pub algorithm: String,
}

/// Root CA material loaded back from storage.
pub struct RootCaSigner {
    pub private_key: PKey<Private>,
    pub certificate: X509,
    pub certificate_pem: String,
}

pub struct RootCaStore {
    storage: Storage,
}

impl RootCaStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// True iff both the key file and the certificate file are present and non-empty.
    pub fn exists(&self) -> bool {
        let non_empty = |path: PathBuf| {
            fs::metadata(path)
                .map(|meta| meta.is_file() && meta.len() > 0)
                .unwrap_or(false)
        };
        non_empty(self.storage.root_key_path()) && non_empty(self.storage.root_cert_path())
    }

    /// `Conflict` when a root CA exists and `force` is not set.
    pub fn ensure_replaceable(&self, force: bool) -> CaResult<()> {
        if self.exists() && !force {
            return Err(CaError::Conflict("CA already exists".to_string()));
        }
        Ok(())
    }

    /// Generate a fresh key pair and self-signed root certificate.
    ///
    /// Fails with `Conflict` when a root CA already exists and `force` is not
    /// set; nothing is touched in that case.
    pub fn generate(&self, params: &RootCaParams, force: bool) -> CaResult<RootCaInfo> {
        self.ensure_replaceable(force)?;

        let (private_key, certificate) = RsaRootCABuilder::new()
            .subject_common_name(params.common_name.clone())
            .validity_days(params.validity_days)
            .key_size(params.key_size)
            .signature_algorithm(params.algorithm)
            .build()?;

        let key_pem = private_key.private_key_to_pem_pkcs8()?;
        let cert_pem = String::from_utf8(certificate.to_pem()?)
            .map_err(|e| CaError::Signing(format!("Certificate PEM is not UTF-8: {}", e)))?;
        self.commit(&key_pem, &cert_pem)?;

        info!(
            common_name = %params.common_name,
            days = params.validity_days,
            key_size = params.key_size,
            algorithm = %params.algorithm,
            force,
            "Root CA generated"
        );

        Ok(RootCaInfo {
            common_name: params.common_name.clone(),
            days: params.validity_days,
            key_size: params.key_size,
            algorithm: params.algorithm.to_string(),
        })
    }

    /// Install an operator-supplied PEM key and certificate, replacing any
    /// existing root CA.
    ///
    /// Both inputs must carry their PEM framing, parse, and belong together;
    /// otherwise a `Validation` error is returned before anything is written.
    pub fn import(&self, private_key_pem: &str, certificate_pem: &str) -> CaResult<()> {
        if private_key_pem.trim().is_empty() || certificate_pem.trim().is_empty() {
            return Err(CaError::Validation(
                "Both private and public PEM must be provided".to_string(),
            ));
        }
        if !pem_codec::has_private_key_framing(private_key_pem)
            || !pem_codec::has_certificate_framing(certificate_pem)
        {
            return Err(CaError::Validation("Invalid PEM format".to_string()));
        }

        let private_key = PKey::private_key_from_pem(private_key_pem.as_bytes())
            .map_err(|e| CaError::Validation(format!("Unreadable private key: {}", e)))?;
        let certificate = X509::from_pem(certificate_pem.as_bytes())
            .map_err(|e| CaError::Validation(format!("Unreadable certificate: {}", e)))?;
        let certificate_key = certificate.public_key()?;
        if !certificate_key.public_eq(&private_key) {
            return Err(CaError::Validation(
                "Private key does not match certificate".to_string(),
            ));
        }

        self.commit(private_key_pem.as_bytes(), certificate_pem)?;
        info!("Root CA imported");
        Ok(())
    }

    /// Load the persisted pair for signing.
    pub fn load_signer(&self) -> CaResult<RootCaSigner> {
        if !self.exists() {
            return Err(CaError::Precondition("Root CA does not exist".to_string()));
        }
        let key_path = self.storage.root_key_path();
        let cert_path = self.storage.root_cert_path();

        let key_pem = fs::read(&key_path)
            .map_err(|e| CaError::io(format!("Failed to read {}", key_path.display()), e))?;
        let certificate_pem = fs::read_to_string(&cert_path)
            .map_err(|e| CaError::io(format!("Failed to read {}", cert_path.display()), e))?;

        let private_key = PKey::private_key_from_pem(&key_pem)
            .map_err(|e| CaError::Signing(format!("Failed to parse root CA key: {}", e)))?;
        let certificate = X509::from_pem(certificate_pem.as_bytes())
            .map_err(|e| CaError::Signing(format!("Failed to parse root CA certificate: {}", e)))?;

        Ok(RootCaSigner {
            private_key,
            certificate,
            certificate_pem,
        })
    }

    fn commit(&self, key_pem: &[u8], cert_pem: &str) -> CaResult<()> {
        let staged = [
            (
                pem_codec::stage_der(cert_pem, &self.storage)?,
                self.storage.root_cert_der_path(),
            ),
            (
                self.storage.stage(cert_pem.as_bytes(), PUBLIC_FILE_MODE)?,
                self.storage.root_cert_path(),
            ),
            (
                self.storage.stage(key_pem, PRIVATE_FILE_MODE)?,
                self.storage.root_key_path(),
            ),
        ];

        let mut committed: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (file, target) in staged {
            if let Err(e) = file.commit(&target) {
                for path in &committed {
                    remove_quietly(path);
                }
                return Err(e);
            }
            committed.push(target);
        }
        Ok(())
    }
}
