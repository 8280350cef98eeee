//! Error types for object retrieval
//!
//! Provides error handling for:
//! - Network transport failures
//! - Integrity checks on downloaded payloads
//! - Post-download transforms (non-fatal, surfaced as warnings)
//! - Destination writes, cancellation and timeouts
//! - Configuration loading

use crate::transform::HandlerKind;
use octo_manifest::{Checksum, ManifestError};
use std::path::PathBuf;
use std::time::Duration;

/// Main fetch error type
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Downloaded payload failed verification
    #[error("integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    /// Request could not be completed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Destination could not be written
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unit was cancelled before completing
    #[error("cancelled")]
    Cancelled,

    /// Request exceeded the configured timeout
    #[error("timed out after {after:?}")]
    Timeout { after: Duration },

    /// Worker task panicked or was aborted
    #[error("worker task failed: {0}")]
    Task(String),

    /// Manifest retrieved online could not be decoded
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Post-processing command failed
    #[error("post-processing '{program}' failed: {reason}")]
    PostProcess { program: String, reason: String },

    /// One or more units of a batch failed
    #[error("{failed} of {total} fetch units failed")]
    BatchFailed { failed: usize, total: usize },
}

impl FetchError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt may succeed
    ///
    /// Transport failures, timeouts and 5xx/408/429 statuses are
    /// retryable. Size and checksum mismatches never are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Integrity(IntegrityError::Status { status }) => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}

/// Payload verification failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// Server answered with a non-success status
    #[error("request failed with status {status}")]
    Status { status: u16 },

    /// Byte count differs from the declared size
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Digest differs from the declared checksum
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: Checksum, actual: Checksum },
}

/// Network failures
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP client error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Any other transport failure
    #[error("{0}")]
    Other(String),
}

/// Transform chain failures; never abort a unit
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// Deobfuscator returned an error
    #[error("deobfuscation failed: {0}")]
    Deobfuscate(String),

    /// Payload still lacks the bundle signature
    #[error("bundle signature missing, left obfuscated")]
    SignatureMissing,

    /// Codec could not convert the payload
    #[error("{handler} conversion to {format} failed: {message}")]
    Convert {
        handler: HandlerKind,
        format: String,
        message: String,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// YAML parse failure
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Config file unreadable
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Value out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result alias for fetch operations
pub type Result<T, E = FetchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(FetchError::Transport(TransportError::Other("reset".into())).is_retryable());
        assert!(FetchError::Timeout { after: Duration::from_secs(1) }.is_retryable());
        assert!(FetchError::from(IntegrityError::Status { status: 503 }).is_retryable());
        assert!(FetchError::from(IntegrityError::Status { status: 429 }).is_retryable());
        assert!(!FetchError::from(IntegrityError::Status { status: 404 }).is_retryable());
        assert!(!FetchError::from(IntegrityError::SizeMismatch { expected: 1, actual: 2 }).is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
    }

    #[test]
    fn checksum_mismatch_message_shows_both_digests() {
        let err = IntegrityError::ChecksumMismatch {
            expected: Checksum::compute(b"a"),
            actual: Checksum::compute(b"b"),
        };
        let msg = err.to_string();
        assert!(msg.contains(&Checksum::compute(b"a").to_string()));
        assert!(msg.contains(&Checksum::compute(b"b").to_string()));
    }
}
