//! Object URL templates

use crate::record::{ObjectRecord, RecordKind};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// URL format string carried by a manifest
///
/// Placeholders:
/// - `{o}` object key
/// - `{g}` generation
/// - `{v}` upload version (defaults to the manifest version)
/// - `{type}` kind tag (`assetbundle` / `resources`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    #[inline]
    #[must_use]
    pub fn new(format: impl Into<String>) -> Self {
        Self(format.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute a record's values into the template
    #[must_use]
    pub fn resolve(&self, record: &ObjectRecord, kind: RecordKind, manifest_version: i32) -> String {
        self.0
            .replace("{type}", kind.url_tag())
            .replace("{o}", record.object_key())
            .replace("{g}", &record.generation().to_string())
            .replace("{v}", &record.upload_version_or(manifest_version).to_string())
    }
}

impl Display for UrlTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UrlTemplate {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UrlTemplate {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
