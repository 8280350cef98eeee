//! Fetch configuration
//!
//! - [`FetchConfig`]: executor-wide settings (workers, timeout, retries,
//!   path categorization vocabulary, bundle signature)
//! - [`FetchOptions`]: per-job destination and conversion requests
//! - [`ManifestSource`]: where and how to retrieve an online manifest
//!
//! All three deserialize from TOML with defaults for absent keys.

use crate::error::ConfigError;
use crate::path::DEFAULT_IDENTIFIERS;
use crate::transform::HandlerKind;
use octo_manifest::{DecryptError, Decryptor, DIGEST_HEADER_LEN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Signature every well-formed bundle payload starts with
pub const DEFAULT_BUNDLE_SIGNATURE: &str = "UnityFS";

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Concurrent fetch units
    pub workers: usize,
    /// Per-request timeout in milliseconds; `None` waits indefinitely
    pub timeout_ms: Option<u64>,
    /// Attempts per unit, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_backoff_ms: u64,
    /// Tokens that end a category path (checked in order)
    pub identifiers: Vec<String>,
    /// Leading bytes of a plain bundle payload
    pub bundle_signature: String,
}

impl FetchConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// With request timeout, rounded up to whole milliseconds
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_ms =
            timeout.map(|t| u64::try_from(t.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX));
        self
    }

    /// With attempt limit
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// With initial retry delay
    #[inline]
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With categorization vocabulary
    #[must_use]
    pub fn with_identifiers<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifiers = identifiers.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Delay before retry number `retry` (1-based)
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for zero workers or zero attempts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "timeout_ms",
                reason: "must be positive; omit it to wait indefinitely".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns `ConfigError` on malformed TOML or out-of-range values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns `ConfigError` if the file is unreadable or invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            timeout_ms: Some(60_000),
            max_attempts: 1,
            retry_backoff_ms: 500,
            identifiers: DEFAULT_IDENTIFIERS.iter().map(|s| (*s).to_string()).collect(),
            bundle_signature: DEFAULT_BUNDLE_SIGNATURE.to_string(),
        }
    }
}

/// Image resize request forwarded to the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageResize {
    /// Fit to an aspect ratio, e.g. 16:9
    Ratio { width: u32, height: u32 },
    /// Exact pixel dimensions
    Exact { width: u32, height: u32 },
}

/// Target formats per media kind; `None` keeps the raw payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub image: Option<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
    pub image_resize: Option<ImageResize>,
}

impl ConvertOptions {
    /// Keep every payload raw
    #[inline]
    #[must_use]
    pub fn raw() -> Self {
        Self::default()
    }

    /// With image target format
    #[must_use]
    pub fn with_image(mut self, format: impl Into<String>) -> Self {
        self.image = Some(format.into());
        self
    }

    /// With audio target format
    #[must_use]
    pub fn with_audio(mut self, format: impl Into<String>) -> Self {
        self.audio = Some(format.into());
        self
    }

    /// With video target format
    #[must_use]
    pub fn with_video(mut self, format: impl Into<String>) -> Self {
        self.video = Some(format.into());
        self
    }

    /// Requested target format for `handler`, lower-cased
    #[must_use]
    pub fn target_for(&self, handler: HandlerKind) -> Option<String> {
        let format = match handler {
            HandlerKind::Image => self.image.as_deref(),
            HandlerKind::Audio => self.audio.as_deref(),
            HandlerKind::Video => self.video.as_deref(),
            HandlerKind::Passthrough => None,
        }?;
        Some(format.to_ascii_lowercase())
    }
}

/// Per-job options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// A directory, or a file path if it has an extension
    pub destination: PathBuf,
    /// Sort into category subdirectories (directory destinations only)
    pub categorize: bool,
    pub convert: ConvertOptions,
}

impl FetchOptions {
    /// Options targeting `destination`, categorized, raw
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// With categorization switched on or off
    #[inline]
    #[must_use]
    pub fn with_categorize(mut self, categorize: bool) -> Self {
        self.categorize = categorize;
        self
    }

    /// With conversion requests
    #[inline]
    #[must_use]
    pub fn with_convert(mut self, convert: ConvertOptions) -> Self {
        self.convert = convert;
        self
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("objects"),
            categorize: true,
            convert: ConvertOptions::default(),
        }
    }
}

/// Online manifest endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSource {
    /// Endpoint prefix; the base revision number is appended
    pub api_url: String,
    /// Headers sent with the request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Hex-encoded AES key
    pub key_hex: String,
    /// Hex-encoded IV; absent means the IV leads the payload
    #[serde(default)]
    pub iv_hex: Option<String>,
    /// Digest bytes to drop from the decrypted payload
    #[serde(default = "default_header_len")]
    pub header_len: usize,
}

fn default_header_len() -> usize {
    DIGEST_HEADER_LEN
}

impl ManifestSource {
    /// Parse from TOML
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on malformed TOML
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Decryptor for this source's key material
    ///
    /// # Errors
    /// Returns `DecryptError` for malformed or wrongly sized key material
    pub fn decryptor(&self) -> Result<Decryptor, DecryptError> {
        Decryptor::from_hex(&self.key_hex, self.iv_hex.as_deref())
    }

    /// Request URL for a base revision
    #[must_use]
    pub fn url_for(&self, base: i32) -> String {
        format!("{}{base}", self.api_url)
    }
}
