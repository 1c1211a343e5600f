//! Subject Alternative Name classification.
//!
//! Operator input is a comma-separated list of host names and IPv4 literals.
//! A token of four dot-separated groups of one to three digits is treated as an
//! IP address, anything else as a DNS name. The certificate's common name is
//! always the first entry.
//!
//! IP groups may carry leading zeros (`192.168.001.010`); each group must fit
//! in an octet. Addresses are stored and encoded in their normalised form.

use crate::error::{CaError, CaResult};
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509Extension, X509v3Context};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanEntry {
    Dns(String),
    Ip(Ipv4Addr),
}

impl SanEntry {
    /// Classify one trimmed token.
    ///
    /// # Errors
    /// `Validation` when the token has the shape of an IPv4 address but a
    /// group is above 255.
    pub fn classify(token: &str) -> CaResult<Self> {
        let token = token.trim();
        match ipv4_groups(token) {
            Some(groups) => {
                let mut octets = [0u8; 4];
                for (octet, group) in octets.iter_mut().zip(groups) {
                    *octet = group.parse::<u8>().map_err(|_| {
                        CaError::Validation(format!("Invalid IP address in SAN list: {}", token))
                    })?;
                }
                Ok(SanEntry::Ip(Ipv4Addr::from(octets)))
            }
            None => Ok(SanEntry::Dns(token.to_string())),
        }
    }
}

impl fmt::Display for SanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanEntry::Dns(name) => write!(f, "DNS:{}", name),
            SanEntry::Ip(addr) => write!(f, "IP:{}", addr),
        }
    }
}

/// The four digit groups of `token` if it has the IPv4 shape.
fn ipv4_groups(token: &str) -> Option<Vec<&str>> {
    let groups: Vec<&str> = token.split('.').collect();
    let shaped = groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()));
    shaped.then_some(groups)
}

/// Build the ordered SAN list: `common_name` first, then every non-empty
/// comma-separated token of `additional`.
///
/// # Errors
/// `Validation` for an IPv4-shaped token that is not a valid address.
pub fn build_san_list(common_name: &str, additional: &str) -> CaResult<Vec<SanEntry>> {
    std::iter::once(common_name)
        .chain(
            additional
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty()),
        )
        .map(SanEntry::classify)
        .collect()
}

/// Encode `entries` as a subjectAltName extension.
pub(crate) fn san_extension(
    entries: &[SanEntry],
    context: &X509v3Context<'_>,
) -> CaResult<X509Extension> {
    let mut san = SubjectAlternativeName::new();
    for entry in entries {
        match entry {
            SanEntry::Dns(name) => san.dns(name),
            SanEntry::Ip(addr) => san.ip(&addr.to_string()),
        };
    }
    san.build(context)
        .map_err(|e| CaError::Signing(format!("Failed to build SubjectAlternativeName: {}", e)))
}
