//! Root CA Certificate Generation Module
//!
//! Generates the self-signed trust anchor that signs every leaf certificate.
//!
//! # Certificate Properties
//! - **Self-signed**: Issuer and subject are the same
//! - **Basic Constraints**: CA=true, critical
//! - **Key Usage**: keyCertSign, cRLSign, critical
//! - **Subject Alternative Name**: the common name, as DNS or IP
//! - **Key Size**: RSA 1024, 2048 or 4096 bits
//! - **Signature**: SHA-1, SHA-256, SHA-384 or SHA-512 with RSA
//!
//! # Example
//! ```rust,no_run
//! use simpleca::generate_root_ca::{RsaRootCABuilder, SignatureAlgorithm};
//! # fn example() -> simpleca::error::CaResult<()> {
//! let (root_key, root_cert) = RsaRootCABuilder::new()
//!     .subject_common_name("SimpleCA Root".to_string())
//!     .validity_days(3650)
//!     .key_size(4096)
//!     .signature_algorithm(SignatureAlgorithm::Sha256)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectKeyIdentifier};
use openssl::x509::X509;

use crate::error::{CaError, CaResult};
use crate::subject_alt_name::{san_extension, SanEntry};

pub(crate) const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
pub const ALLOWED_KEY_SIZES: [u32; 3] = [1024, 2048, 4096];
pub const MAX_VALIDITY_DAYS: u32 = 36500;

/// Digest used when self-signing the root certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl SignatureAlgorithm {
    pub fn message_digest(self) -> MessageDigest {
        match self {
            SignatureAlgorithm::Sha1 => MessageDigest::sha1(),
            SignatureAlgorithm::Sha256 => MessageDigest::sha256(),
            SignatureAlgorithm::Sha384 => MessageDigest::sha384(),
            SignatureAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" => Ok(SignatureAlgorithm::Sha1),
            "sha256" => Ok(SignatureAlgorithm::Sha256),
            "sha384" => Ok(SignatureAlgorithm::Sha384),
            "sha512" => Ok(SignatureAlgorithm::Sha512),
            other => Err(CaError::Validation(format!(
                "Invalid algorithm '{}'. Allowed: sha1, sha256, sha384, sha512",
                other
            ))),
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureAlgorithm::Sha1 => "sha1",
            SignatureAlgorithm::Sha256 => "sha256",
            SignatureAlgorithm::Sha384 => "sha384",
            SignatureAlgorithm::Sha512 => "sha512",
        };
        f.write_str(name)
    }
}

/// Reject validity periods outside `1..=36500` days.
pub fn validate_validity_days(days: u32) -> CaResult<()> {
    if days == 0 || days > MAX_VALIDITY_DAYS {
        return Err(CaError::Validation("Invalid days value".to_string()));
    }
    Ok(())
}

/// Reject RSA key sizes other than 1024, 2048 and 4096.
pub fn validate_key_size(key_size: u32) -> CaResult<()> {
    if !ALLOWED_KEY_SIZES.contains(&key_size) {
        return Err(CaError::Validation(
            "Invalid keySize. Allowed: 1024, 2048, 4096".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn generate_rsa_key(key_size: u32) -> CaResult<PKey<Private>> {
    let rsa = openssl::rsa::Rsa::generate(key_size)
        .map_err(|e| CaError::Signing(format!("Failed to generate RSA keypair: {}", e)))?;
    PKey::from_rsa(rsa).map_err(|e| CaError::Signing(format!("Failed to create private key: {}", e)))
}

pub(crate) fn random_serial() -> CaResult<openssl::asn1::Asn1Integer> {
    // Random 128-bit serial number
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial.to_asn1_integer()?)
}

// ================= RSA Root CA Builder =================

/// Builder for an RSA key pair and its self-signed root CA certificate.
pub struct RsaRootCABuilder {
    subject_common_name: String,
    validity_days: u32,
    key_size: u32,
    signature_algorithm: SignatureAlgorithm,
}

impl Default for RsaRootCABuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RsaRootCABuilder {
    /// Create a builder with a ten-year validity, RSA-2048 and SHA-256
    pub fn new() -> Self {
        Self {
            subject_common_name: String::new(),
            validity_days: 3650,
            key_size: 2048,
            signature_algorithm: SignatureAlgorithm::default(),
        }
    }

    /// Set the common name (CN) for the certificate
    ///
    /// The CN is also the certificate's only SAN entry, as an IP address when
    /// it has the IPv4 shape and as a DNS name otherwise.
    ///
    /// # Arguments
    /// * `cn` - Common name (e.g., "SimpleCA Root", "10.0.0.1")
    ///
    /// # Returns
    /// Self for method chaining
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set validity period in days (1 to 36500)
    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Set the RSA modulus size: 1024, 2048 or 4096 bits
    pub fn key_size(mut self, bits: u32) -> Self {
        self.key_size = bits;
        self
    }

    pub fn signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    /// Generate the key pair and the self-signed certificate.
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (private key, self-signed certificate)
    ///
    /// # Errors
    /// - `Validation` for an empty common name, an IPv4-shaped common name
    ///   that is not a valid address, or out-of-range days/key size
    /// - `Signing` if key generation, extension encoding or signing fails
    pub fn build(self) -> CaResult<(PKey<Private>, X509)> {
        if self.subject_common_name.trim().is_empty() {
            return Err(CaError::Validation("commonName must not be empty".to_string()));
        }
        validate_validity_days(self.validity_days)?;
        validate_key_size(self.key_size)?;
        let san_entry = SanEntry::classify(&self.subject_common_name)?;

        let private_key = generate_rsa_key(self.key_size)?;

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;
        let serial = random_serial()?;
        builder.set_serial_number(&serial)?;

        let mut name_builder = openssl::x509::X509Name::builder()?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::COMMONNAME, &self.subject_common_name)
            .map_err(|e| CaError::Signing(format!("Failed to set CN: {}", e)))?;
        let name = name_builder.build();
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;

        let not_before = openssl::asn1::Asn1Time::days_from_now(0)?;
        builder.set_not_before(&not_before)?;
        let not_after = openssl::asn1::Asn1Time::days_from_now(self.validity_days)?;
        builder.set_not_after(&not_after)?;

        builder.set_pubkey(&private_key)?;

        let bc = BasicConstraints::new()
            .critical()
            .ca()
            .build()
            .map_err(|e| CaError::Signing(format!("Failed to build BasicConstraints: {}", e)))?;
        builder.append_extension(bc)?;

        let ku = KeyUsage::new()
            .critical()
            .key_cert_sign()
            .crl_sign()
            .build()
            .map_err(|e| CaError::Signing(format!("Failed to build KeyUsage: {}", e)))?;
        builder.append_extension(ku)?;

        let ski = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
        builder.append_extension(ski)?;

        let san = san_extension(
            &[san_entry],
            &builder.x509v3_context(None, None),
        )?;
        builder.append_extension(san)?;

        builder
            .sign(&private_key, self.signature_algorithm.message_digest())
            .map_err(|e| CaError::Signing(format!("Failed to sign certificate: {}", e)))?;

        Ok((private_key, builder.build()))
    }
}
