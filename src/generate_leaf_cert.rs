//! Leaf Certificate Generation Module
//!
//! Builds TLS server (end-entity) certificates signed directly by the root CA.
//! Issuance is done in-process in two steps, like a CA would receive it:
//!
//! 1. a PKCS#10 certificate signing request is created for a fresh key,
//!    carrying the subject and the requested extensions;
//! 2. the request's self-signature is checked and the request is signed by the
//!    root key, copying subject, public key and requested extensions.
//!
//! # X.509 Extensions
//! - **Basic Constraints**: CA=false, critical
//! - **Key Usage**: digitalSignature, keyEncipherment, critical
//! - **Extended Key Usage**: serverAuth
//! - **Subject Alternative Name**: common name first, then the additional names

use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::stack::Stack;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, KeyUsage};
use openssl::x509::{X509Req, X509ReqBuilder, X509};

use crate::error::{CaError, CaResult};
use crate::generate_root_ca::{
    generate_rsa_key, random_serial, validate_key_size, validate_validity_days, X509_VERSION_3,
};
use crate::subject_alt_name::{san_extension, SanEntry};

// ================= RSA Leaf Certificate Builder =================

/// Builder for an RSA key pair and a server certificate signed by the root CA.
pub struct RsaLeafCertBuilder<'a> {
    subject_common_name: String,
    subject_alt_names: Vec<SanEntry>,
    validity_days: u32,
    key_size: u32,
    signing_key: &'a PKeyRef<Private>,
    signing_cert: &'a X509,
}

impl<'a> RsaLeafCertBuilder<'a> {
    /// Create a builder that signs with the given root CA
    ///
    /// # Arguments
    /// * `ca_key` - Root CA private key used to sign the request
    /// * `ca_cert` - Root CA certificate (issuer name)
    pub fn new(ca_key: &'a PKeyRef<Private>, ca_cert: &'a X509) -> Self {
        Self {
            subject_common_name: String::new(),
            subject_alt_names: Vec::new(),
            validity_days: 365,
            key_size: 2048,
            signing_key: ca_key,
            signing_cert: ca_cert,
        }
    }

    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set the subject alternative names, in certificate order
    ///
    /// # Arguments
    /// * `entries` - Ordered SAN entries, as produced by
    ///   [`build_san_list`](crate::subject_alt_name::build_san_list)
    ///
    /// # Returns
    /// Self for method chaining
    pub fn subject_alt_names(mut self, entries: Vec<SanEntry>) -> Self {
        self.subject_alt_names = entries;
        self
    }

    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    pub fn key_size(mut self, bits: u32) -> Self {
        self.key_size = bits;
        self
    }

    /// Generate the key, the signing request and the CA-signed certificate.
    ///
    /// # Returns
    /// * `Ok((PKey<Private>, X509))` - Tuple of (leaf private key, leaf certificate)
    ///
    /// # Errors
    /// - `Validation` for out-of-range days/key size or an empty SAN list
    /// - `Signing` if key generation, request creation or signing fails
    pub fn build(self) -> CaResult<(PKey<Private>, X509)> {
        validate_validity_days(self.validity_days)?;
        validate_key_size(self.key_size)?;
        if self.subject_alt_names.is_empty() {
            return Err(CaError::Validation(
                "At least one subject alternative name is required".to_string(),
            ));
        }

        let private_key = generate_rsa_key(self.key_size)?;
        let request = self.build_request(&private_key)?;
        let certificate = self.sign_request(&request)?;
        Ok((private_key, certificate))
    }

    fn build_request(&self, private_key: &PKey<Private>) -> CaResult<X509Req> {
        let mut req = X509ReqBuilder::new()?;
        req.set_version(0)?;
        req.set_pubkey(private_key)?;

        let mut name_builder = openssl::x509::X509Name::builder()?;
        name_builder
            .append_entry_by_nid(openssl::nid::Nid::COMMONNAME, &self.subject_common_name)
            .map_err(|e| CaError::Signing(format!("Failed to set CN: {}", e)))?;
        let name = name_builder.build();
        req.set_subject_name(&name)?;

        let mut extensions = Stack::new()?;
        extensions.push(san_extension(
            &self.subject_alt_names,
            &req.x509v3_context(None),
        )?)?;
        extensions.push(
            BasicConstraints::new()
                .critical()
                .build()
                .map_err(|e| CaError::Signing(format!("Failed to build BasicConstraints: {}", e)))?,
        )?;
        extensions.push(
            KeyUsage::new()
                .critical()
                .digital_signature()
                .key_encipherment()
                .build()
                .map_err(|e| CaError::Signing(format!("Failed to build KeyUsage: {}", e)))?,
        )?;
        extensions.push(
            ExtendedKeyUsage::new()
                .server_auth()
                .build()
                .map_err(|e| CaError::Signing(format!("Failed to build ExtendedKeyUsage: {}", e)))?,
        )?;
        req.add_extensions(&extensions)?;

        req.sign(private_key, MessageDigest::sha256())
            .map_err(|e| CaError::Signing(format!("Failed to sign request: {}", e)))?;
        Ok(req.build())
    }

    fn sign_request(&self, request: &X509Req) -> CaResult<X509> {
        let request_key = request.public_key()?;
        if !request.verify(&request_key)? {
            return Err(CaError::Signing(
                "Certificate signing request signature does not verify".to_string(),
            ));
        }

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;
        let serial = random_serial()?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(request.subject_name())?;
        builder
            .set_issuer_name(self.signing_cert.subject_name())
            .map_err(|e| CaError::Signing(format!("Failed to set issuer from root CA: {}", e)))?;
        builder.set_pubkey(&request_key)?;

        let not_before = openssl::asn1::Asn1Time::days_from_now(0)?;
        builder.set_not_before(&not_before)?;
        let not_after = openssl::asn1::Asn1Time::days_from_now(self.validity_days)?;
        builder.set_not_after(&not_after)?;

        for extension in request.extensions()? {
            builder.append_extension(extension)?;
        }

        builder
            .sign(self.signing_key, MessageDigest::sha256())
            .map_err(|e| CaError::Signing(format!("Failed to sign certificate: {}", e)))?;
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_root_ca::RsaRootCABuilder;
    use crate::subject_alt_name::build_san_list;

    fn root() -> (PKey<Private>, X509) {
        RsaRootCABuilder::new()
            .subject_common_name("Test Root".to_string())
            .key_size(1024)
            .validity_days(10)
            .build()
            .unwrap()
    }

    #[test]
    fn test_leaf_is_signed_by_root() {
        let (ca_key, ca_cert) = root();
        let (leaf_key, leaf_cert) = RsaLeafCertBuilder::new(&ca_key, &ca_cert)
            .subject_common_name("example.com".to_string())
            .subject_alt_names(
                build_san_list("example.com", "192.168.1.1,api.example.com").unwrap(),
            )
            .key_size(1024)
            .validity_days(30)
            .build()
            .unwrap();

        assert!(leaf_cert.verify(&ca_key).unwrap());
        assert!(leaf_cert.public_key().unwrap().public_eq(&leaf_key));
        assert_eq!(
            leaf_cert.issuer_name().to_der().unwrap(),
            ca_cert.subject_name().to_der().unwrap()
        );
    }

    #[test]
    fn test_san_order_and_extensions() {
        let (ca_key, ca_cert) = root();
        let (_, leaf_cert) = RsaLeafCertBuilder::new(&ca_key, &ca_cert)
            .subject_common_name("example.com".to_string())
            .subject_alt_names(
                build_san_list("example.com", "192.168.1.1,api.example.com").unwrap(),
            )
            .key_size(1024)
            .build()
            .unwrap();

        let sans = leaf_cert.subject_alt_names().unwrap();
        let names: Vec<String> = sans
            .iter()
            .map(|name| match (name.dnsname(), name.ipaddress()) {
                (Some(dns), _) => format!("DNS:{}", dns),
                (None, Some(ip)) => format!(
                    "IP:{}",
                    ip.iter().map(u8::to_string).collect::<Vec<_>>().join(".")
                ),
                _ => "other".to_string(),
            })
            .collect();
        assert_eq!(
            names,
            vec!["DNS:example.com", "IP:192.168.1.1", "DNS:api.example.com"]
        );

        let text = String::from_utf8(leaf_cert.to_text().unwrap()).unwrap();
        assert!(text.contains("CA:FALSE"));
        assert!(text.contains("Digital Signature, Key Encipherment"));
        assert!(text.contains("TLS Web Server Authentication"));
    }

    #[test]
    fn test_missing_sans_rejected() {
        let (ca_key, ca_cert) = root();
        let result = RsaLeafCertBuilder::new(&ca_key, &ca_cert)
            .subject_common_name("example.com".to_string())
            .key_size(1024)
            .build();
        assert!(matches!(result, Err(CaError::Validation(_))));
    }
}
