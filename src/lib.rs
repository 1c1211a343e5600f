//! SimpleCA - a small private certificate authority
//!
//! Creates or imports a root CA key pair, issues TLS server certificates
//! signed by that root, and keeps a durable registry of the issued leaf
//! certificates for listing, download and deletion.
//!
//! # Storage Layout
//!
//! Everything lives in one storage directory:
//!
//! ```text
//! data/
//!   root.key.pem        root private key (0600)
//!   root.crt.pem        root certificate
//!   root.crt.der        root certificate, DER encoded
//!   certs.json          leaf certificate registry
//!   <stem>.key.pem      leaf private key (0600)
//!   <stem>.crt.pem      leaf certificate
//!   <stem>.chain.pem    leaf + root certificate
//! ```
//!
//! # Example
//!
//! ```no_run
//! use simpleca::authority::CertificateAuthority;
//! use simpleca::generate_root_ca::SignatureAlgorithm;
//! use simpleca::leaf_issuer::LeafRequest;
//! use simpleca::root_ca_store::RootCaParams;
//! use simpleca::storage::Storage;
//!
//! # fn main() -> simpleca::error::CaResult<()> {
//! let ca = CertificateAuthority::new(Storage::new("data"));
//!
//! ca.generate_root_ca(
//!     &RootCaParams {
//!         common_name: "SimpleCA Root".to_string(),
//!         validity_days: 3650,
//!         key_size: 4096,
//!         algorithm: SignatureAlgorithm::Sha256,
//!     },
//!     false,
//! )?;
//!
//! let entry = ca.issue_leaf(&LeafRequest {
//!     common_name: "example.com".to_string(),
//!     sans: "192.168.1.1,api.example.com".to_string(),
//!     validity_days: 365,
//!     key_size: 2048,
//! })?;
//! println!("{} expires {}", entry.name, entry.expiry);
//!
//! ca.delete_leaf("example.com")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Core operations return [`error::CaResult`]. Validation, conflict,
//! precondition and not-found errors are raised before anything is written.
//! Failed issuance removes its partial files, and a failed deletion leaves
//! the registry entry in place with a report of what happened to each file.

pub mod authority;
pub mod configs;
pub mod deletion;
pub mod error;
pub mod generate_leaf_cert;
pub mod generate_root_ca;
pub mod leaf_issuer;
pub mod pem_codec;
pub mod registry;
pub mod root_ca_store;
pub mod storage;
pub mod subject_alt_name;
pub mod webserver;
