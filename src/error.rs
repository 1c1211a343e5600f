//! Error types for certificate authority operations.

use serde::Serialize;
use thiserror::Error;

/// Result type for certificate authority operations
pub type CaResult<T> = Result<T, CaError>;

/// Failure categories surfaced by the root CA store, the leaf issuer and the
/// deletion coordinator.
///
/// Every variant except `Io`, `Signing` and `Deletion` is raised before any
/// file or registry mutation takes place.
#[derive(Error, Debug)]
pub enum CaError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Deletion failed for {name}")]
    Deletion {
        name: String,
        report: DeletionReport,
    },
}

impl CaError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CaError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<openssl::error::ErrorStack> for CaError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        CaError::Signing(error.to_string())
    }
}

/// Outcome of removing a registry entry's backing files.
///
/// Returned on success, and carried inside [`CaError::Deletion`] when at least
/// one file could not be handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub deleted: Vec<String>,
    pub missing: Vec<String>,
    pub errors: Vec<FileError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: String,
    pub reason: String,
}

impl DeletionReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_message_includes_context() {
        let err = CaError::io(
            "Failed to write root.key.pem",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("root.key.pem"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_report_serializes_all_buckets() {
        let report = DeletionReport {
            deleted: vec!["a.crt.pem".to_string()],
            missing: vec!["a.key.pem".to_string()],
            errors: vec![FileError {
                file: "../a.chain.pem".to_string(),
                reason: "outside storage directory".to_string(),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["deleted"][0], "a.crt.pem");
        assert_eq!(json["missing"][0], "a.key.pem");
        assert_eq!(json["errors"][0]["file"], "../a.chain.pem");
        assert!(report.has_errors());
    }
}
