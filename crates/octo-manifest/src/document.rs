//! Structured document form of a manifest
//!
//! The JSON layout follows the protobuf JSON mapping of the wire form:
//! camelCase keys, default-valued fields omitted, `uint64` rendered as a
//! string. Revisions render as a bare integer or a `[this, base]` pair.

use crate::revision::RevisionRepr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Whole-manifest document
///
/// Record lists are optional because compact diff payloads omit unchanged
/// kinds. The URL template is optional here only so that its absence can be
/// reported as `MissingField` rather than as a JSON error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub revision: RevisionRepr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_bundle_list: Option<Vec<RecordDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_list: Option<Vec<RecordDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_format: Option<String>,
}

/// Raw, unvalidated record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDocument {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub crc: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub object_name: String,
    #[serde(default, skip_serializing_if = "Generation::is_zero")]
    pub generation: Generation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_version_id: Option<i32>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

/// Server generation; written as a string, read from a string or a number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    #[allow(clippy::trivially_copy_pass_by_ref)]
    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for Generation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Generation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(s) => s.parse().map(Self).map_err(serde::de::Error::custom),
        }
    }
}
