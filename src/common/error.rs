//! Common Error Types for the Transparency Service
//!
//! Provides the unified error taxonomy the registration pipeline and the
//! HTTP surface agree on. The core returns typed errors; callers map them
//! to transport codes via `http_status`.

use thiserror::Error;

/// Root error type for the transparency service
#[derive(Debug, Error)]
pub enum ScittError {
    /// CBOR/COSE decode failure or wrong structure
    #[error("malformed statement: {0}")]
    MalformedStatement(String),

    /// Statement algorithm is not ES256
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Required CWT claims (iss, sub) absent
    #[error("missing claims: {0}")]
    MissingClaims(String),

    /// Statement signature invalid under the acceptance policy
    #[error("bad signature: {0}")]
    BadSignature(String),

    /// Entry index past the tree size, or unknown tile
    #[error("not found: {0}")]
    NotFound(String),

    /// Inclusion/consistency verification rejected
    #[error("proof failure: {0}")]
    ProofFailure(String),

    /// Blob or index I/O failure
    #[error("storage error: {0}")]
    StorageIo(String),

    /// Root mismatch after append or unrecoverable state divergence.
    /// Fatal: the service refuses further writes until operator
    /// intervention.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScittError {
    /// Create a malformed-statement error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedStatement(msg.into())
    }

    /// Create a missing-claims error
    pub fn missing_claims(msg: impl Into<String>) -> Self {
        Self::MissingClaims(msg.into())
    }

    /// Create a bad-signature error
    pub fn bad_signature(msg: impl Into<String>) -> Self {
        Self::BadSignature(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageIo(msg.into())
    }

    /// Create an internal-inconsistency error
    pub fn inconsistency(msg: impl Into<String>) -> Self {
        Self::InternalInconsistency(msg.into())
    }

    /// Whether a retry could succeed. Appends are never auto-retried:
    /// partial visibility is possible, so the caller re-submits instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScittError::StorageIo(_) | ScittError::Io(_))
    }

    /// Whether the service must refuse further writes
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScittError::InternalInconsistency(_))
    }

    /// Stable error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            ScittError::MalformedStatement(_) => "MALFORMED_STATEMENT",
            ScittError::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
            ScittError::MissingClaims(_) => "MISSING_CLAIMS",
            ScittError::BadSignature(_) => "BAD_SIGNATURE",
            ScittError::NotFound(_) => "NOT_FOUND",
            ScittError::ProofFailure(_) => "PROOF_FAILURE",
            ScittError::StorageIo(_) => "STORAGE_ERROR",
            ScittError::InternalInconsistency(_) => "INTERNAL_INCONSISTENCY",
            ScittError::Config(_) => "CONFIG_ERROR",
            ScittError::Io(_) => "IO_ERROR",
        }
    }

    /// HTTP status the transport layer maps this error to
    pub fn http_status(&self) -> u16 {
        match self {
            ScittError::MalformedStatement(_)
            | ScittError::UnsupportedAlgorithm(_)
            | ScittError::MissingClaims(_)
            | ScittError::BadSignature(_) => 400,
            ScittError::NotFound(_) => 404,
            ScittError::ProofFailure(_) => 422,
            ScittError::StorageIo(_) => 503,
            ScittError::InternalInconsistency(_)
            | ScittError::Config(_)
            | ScittError::Io(_) => 500,
        }
    }
}

impl From<crate::tlog::TlogError> for ScittError {
    fn from(err: crate::tlog::TlogError) -> Self {
        use crate::tlog::TlogError;
        match err {
            TlogError::Storage(e) => ScittError::StorageIo(e.to_string()),
            TlogError::NotFound { index, size } => {
                ScittError::NotFound(format!("entry {} in tree of size {}", index, size))
            }
            TlogError::EmptyTree => ScittError::NotFound("empty tree".to_string()),
            TlogError::Corrupt(msg) => ScittError::InternalInconsistency(msg),
            TlogError::Merkle(e) => ScittError::ProofFailure(e.to_string()),
        }
    }
}

impl From<crate::index::IndexError> for ScittError {
    fn from(err: crate::index::IndexError) -> Self {
        ScittError::StorageIo(err.to_string())
    }
}

/// Result type alias using ScittError
pub type Result<T> = std::result::Result<T, ScittError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_statuses() {
        let err = ScittError::malformed("truncated CBOR");
        assert!(err.to_string().contains("truncated CBOR"));
        assert_eq!(err.error_code(), "MALFORMED_STATEMENT");
        assert_eq!(err.http_status(), 400);

        assert_eq!(ScittError::not_found("entry 9").http_status(), 404);
        assert_eq!(ScittError::storage("blob get").http_status(), 503);
        assert_eq!(ScittError::inconsistency("root mismatch").http_status(), 500);
    }

    #[test]
    fn test_retry_and_fatal_flags() {
        assert!(ScittError::storage("timeout").is_retryable());
        assert!(!ScittError::bad_signature("nope").is_retryable());
        assert!(ScittError::inconsistency("root mismatch").is_fatal());
        assert!(!ScittError::storage("timeout").is_fatal());
    }
}
