//! Error types for manifest handling
//!
//! Provides error handling for:
//! - Revision construction and the diff/merge algebra
//! - Record validation (parse-time)
//! - Index construction and lookup
//! - Wire, document and tabular codecs
//! - Manifest decryption

use crate::index::IndexError;
use crate::revision::RevisionError;
use std::path::PathBuf;

/// Main manifest error type
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Malformed record or revision
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Revision algebra precondition violated
    #[error("revision error: {0}")]
    Revision(#[from] RevisionError),

    /// Index invariant violated or key missing
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Required manifest field absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Protobuf decode failure
    #[error("wire decode error: {0}")]
    WireDecode(#[from] prost::DecodeError),

    /// JSON document failure
    #[error("document error: {0}")]
    Document(#[from] serde_json::Error),

    /// Tabular export failure
    #[error("tabular export error: {0}")]
    Tabular(#[from] csv::Error),

    /// Invalid search pattern
    #[error("invalid search pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Manifest decryption failed
    #[error("decrypt error: {0}")]
    Decrypt(#[from] DecryptError),

    /// IO error on manifest file
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No loader attempt accepted the input
    #[error("unrecognized manifest format ({})", format_attempts(.attempts))]
    Unrecognized { attempts: Vec<(&'static str, String)> },
}

impl ManifestError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_attempts(attempts: &[(&'static str, String)]) -> String {
    attempts
        .iter()
        .map(|(name, reason)| format!("{name}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse-time record validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Record id must be positive
    #[error("record id must be positive, got {0}")]
    NonPositiveId(i32),

    /// Record name must be non-empty
    #[error("record {id} has an empty name")]
    EmptyName { id: i32 },

    /// Declared size must be non-negative
    #[error("record {id} has negative size {size}")]
    NegativeSize { id: i32, size: i64 },

    /// Checksum is not a valid digest
    #[error("record {id} has malformed checksum '{value}': {reason}")]
    MalformedChecksum {
        id: i32,
        value: String,
        reason: String,
    },

    /// Unknown lifecycle state
    #[error("record {id} has unknown state '{value}'")]
    UnknownState { id: i32, value: String },
}

/// Manifest decryption errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecryptError {
    /// Key or IV has an unsupported length
    #[error("invalid key/iv length: key {key} bytes, iv {iv} bytes")]
    InvalidKeyLength { key: usize, iv: usize },

    /// Hex-encoded key material could not be decoded
    #[error("invalid hex key material: {0}")]
    InvalidHex(String),

    /// Ciphertext shorter than one block
    #[error("ciphertext too short: {len} bytes")]
    TooShort { len: usize },

    /// Block padding malformed after decryption
    #[error("invalid block padding")]
    Padding,
}

impl From<hex::FromHexError> for DecryptError {
    fn from(value: hex::FromHexError) -> Self {
        Self::InvalidHex(value.to_string())
    }
}

/// Result alias for manifest operations
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_lists_every_attempt() {
        let err = ManifestError::Unrecognized {
            attempts: vec![
                ("document", "expected value".to_string()),
                ("wire", "buffer underflow".to_string()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("document: expected value"));
        assert!(msg.contains("wire: buffer underflow"));
    }

    #[test]
    fn validation_converts_into_manifest_error() {
        let err: ManifestError = ValidationError::NonPositiveId(0).into();
        assert!(matches!(err, ManifestError::Validation(ValidationError::NonPositiveId(0))));
    }
}
