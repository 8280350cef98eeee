//! Post-download transform chain
//!
//! After a payload passes verification it goes through, in order:
//! 1. a signature check (bundles only)
//! 2. the [`Deobfuscator`] if the signature is missing, then a re-check
//! 3. the [`Codec`] if the job requests a target format for the payload's
//!    [`HandlerKind`]
//!
//! No step can fail a unit. A failed step leaves the verified raw payload
//! in place and records a [`TransformError`] as a warning.

use crate::config::ConvertOptions;
use crate::error::TransformError;
use octo_manifest::RecordKind;
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::sync::Arc;

/// Media handler selected for a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Image,
    Audio,
    Video,
    /// Written as downloaded
    Passthrough,
}

impl Display for HandlerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Passthrough => "passthrough",
        })
    }
}

/// Handler for an object, by bundle name prefix or resource extension
#[must_use]
pub fn select_handler(kind: RecordKind, name: &str) -> HandlerKind {
    match kind {
        RecordKind::Bundle => {
            if name.starts_with("img_") || name.starts_with("spi_") {
                HandlerKind::Image
            } else if name.starts_with("sud_") {
                HandlerKind::Audio
            } else if name.starts_with("mov_") || name.starts_with("adv_") {
                HandlerKind::Video
            } else {
                HandlerKind::Passthrough
            }
        }
        RecordKind::Resource => {
            let ext = Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase);
            match ext.as_deref() {
                Some("png" | "jpg" | "jpeg" | "webp") => HandlerKind::Image,
                Some("acb" | "awb" | "wav" | "mp3" | "ogg") => HandlerKind::Audio,
                Some("usm" | "mp4" | "webm") => HandlerKind::Video,
                _ => HandlerKind::Passthrough,
            }
        }
    }
}

/// Reverses the server's byte-level obfuscation of bundle payloads
pub trait Deobfuscator: Send + Sync {
    /// Deobfuscate the payload of the object called `name`
    ///
    /// # Errors
    /// Returns `TransformError::Deobfuscate` if the payload cannot be processed
    fn deobfuscate(&self, name: &str, payload: &[u8]) -> Result<Vec<u8>, TransformError>;
}

/// Media format conversion
pub trait Codec: Send + Sync {
    /// Convert `payload` to `format`
    ///
    /// # Errors
    /// Returns `TransformError::Convert` if conversion fails
    fn convert(
        &self,
        handler: HandlerKind,
        payload: &[u8],
        format: &str,
        options: &ConvertOptions,
    ) -> Result<Vec<u8>, TransformError>;
}

/// Result of running the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub bytes: Vec<u8>,
    /// Extension of the converted payload; `None` if written raw
    pub extension: Option<String>,
    pub warnings: Vec<TransformError>,
}

/// Ordered transform chain with optional collaborators
#[derive(Clone, Default)]
pub struct TransformChain {
    signature: Vec<u8>,
    deobfuscator: Option<Arc<dyn Deobfuscator>>,
    codec: Option<Arc<dyn Codec>>,
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformChain")
            .field("signature", &String::from_utf8_lossy(&self.signature))
            .field("deobfuscator", &self.deobfuscator.is_some())
            .field("codec", &self.codec.is_some())
            .finish()
    }
}

impl TransformChain {
    /// Chain checking bundles for `signature`, with no collaborators
    #[must_use]
    pub fn new(signature: impl Into<Vec<u8>>) -> Self {
        Self {
            signature: signature.into(),
            deobfuscator: None,
            codec: None,
        }
    }

    /// With deobfuscator
    #[must_use]
    pub fn with_deobfuscator(mut self, deobfuscator: Arc<dyn Deobfuscator>) -> Self {
        self.deobfuscator = Some(deobfuscator);
        self
    }

    /// With codec
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Extension a successful conversion would produce, if any is planned
    #[must_use]
    pub fn planned_extension(&self, kind: RecordKind, name: &str, options: &ConvertOptions) -> Option<String> {
        self.codec.as_ref()?;
        options.target_for(select_handler(kind, name))
    }

    /// Run the chain on a verified payload
    #[must_use]
    pub fn apply(&self, kind: RecordKind, name: &str, raw: Vec<u8>, options: &ConvertOptions) -> Transformed {
        let mut warnings = Vec::new();
        let mut bytes = raw;

        let mut readable = true;
        if kind == RecordKind::Bundle && !bytes.starts_with(&self.signature) {
            match self.deobfuscate(name, &bytes) {
                Ok(plain) => bytes = plain,
                Err(e) => {
                    warnings.push(e);
                    readable = false;
                }
            }
        }

        // A still-obfuscated bundle is written raw, never handed to the codec
        let handler = select_handler(kind, name);
        let target = options.target_for(handler).filter(|_| readable);
        let mut extension = None;
        if let (Some(codec), Some(format)) = (&self.codec, target) {
            match codec.convert(handler, &bytes, &format, options) {
                Ok(converted) => {
                    bytes = converted;
                    extension = Some(format);
                }
                Err(e) => warnings.push(e),
            }
        }

        Transformed {
            bytes,
            extension,
            warnings,
        }
    }

    fn deobfuscate(&self, name: &str, payload: &[u8]) -> Result<Vec<u8>, TransformError> {
        let deobfuscator = self.deobfuscator.as_ref().ok_or(TransformError::SignatureMissing)?;
        let plain = deobfuscator.deobfuscate(name, payload)?;
        if plain.starts_with(&self.signature) {
            Ok(plain)
        } else {
            Err(TransformError::SignatureMissing)
        }
    }
}
