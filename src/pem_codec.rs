//! PEM/DER Codec Module
//!
//! Converts certificate material between PEM text and raw DER bytes and checks
//! PEM framing on operator-supplied input. No certificate structure is
//! validated here beyond a successful base64 decode.

use crate::error::{CaError, CaResult};
use crate::storage::{StagedFile, Storage, PUBLIC_FILE_MODE};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const CERTIFICATE_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const CERTIFICATE_END: &str = "-----END CERTIFICATE-----";
const PRIVATE_KEY_BEGIN_PREFIX: &str = "-----BEGIN ";
const PRIVATE_KEY_BEGIN_SUFFIX: &str = "PRIVATE KEY-----";

/// Decode the first `CERTIFICATE` block of `pem` into DER bytes.
///
/// Text before the BEGIN marker and after the END marker is ignored, so a
/// full-chain file yields its leading certificate.
pub fn pem_to_der(pem: &str) -> CaResult<Vec<u8>> {
    let start = pem
        .find(CERTIFICATE_BEGIN)
        .ok_or_else(|| CaError::Validation("Missing BEGIN CERTIFICATE marker".to_string()))?;
    let body_start = start + CERTIFICATE_BEGIN.len();
    let body_len = pem[body_start..]
        .find(CERTIFICATE_END)
        .ok_or_else(|| CaError::Validation("Missing END CERTIFICATE marker".to_string()))?;

    let body: String = pem[body_start..body_start + body_len]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    STANDARD
        .decode(body.as_bytes())
        .map_err(|e| CaError::Validation(format!("Invalid base64 in certificate PEM: {}", e)))
}

/// Decode `pem` and stage the DER bytes as a public file in `storage`.
///
/// # Arguments
/// * `pem` - Certificate PEM; only the first block is used
/// * `storage` - Storage directory the DER copy will live in
///
/// # Returns
/// A [`StagedFile`] that lands on its target path once committed.
///
/// # Errors
/// `Validation` for undecodable PEM, `Io` if the temp file cannot be written.
pub fn stage_der(pem: &str, storage: &Storage) -> CaResult<StagedFile> {
    let der = pem_to_der(pem)?;
    storage.stage(&der, PUBLIC_FILE_MODE)
}

/// True when `text` contains a complete `CERTIFICATE` PEM block.
pub fn has_certificate_framing(text: &str) -> bool {
    match text.find(CERTIFICATE_BEGIN) {
        Some(start) => text[start..].contains(CERTIFICATE_END),
        None => false,
    }
}

/// True when `text` contains a BEGIN marker for any private key flavour
/// (`PRIVATE KEY`, `RSA PRIVATE KEY`, `EC PRIVATE KEY`, `ENCRYPTED PRIVATE KEY`).
pub fn has_private_key_framing(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        line.starts_with(PRIVATE_KEY_BEGIN_PREFIX) && line.ends_with(PRIVATE_KEY_BEGIN_SUFFIX)
    })
}
