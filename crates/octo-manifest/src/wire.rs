//! Binary wire form (protobuf)
//!
//! Field numbers match the server's object database schema. Fields this
//! crate does not model (file path, priority, tag ids, tag names) are
//! skipped on decode.

use crate::document::{Generation, ManifestDocument, RecordDocument};
use crate::record::ObjectState;
use crate::revision::RevisionRepr;
use prost::Message;

/// Top-level object database
#[derive(Clone, PartialEq, Message)]
pub struct Database {
    #[prost(int32, tag = "1")]
    pub revision: i32,
    #[prost(message, repeated, tag = "2")]
    pub asset_bundle_list: Vec<Data>,
    #[prost(message, repeated, tag = "4")]
    pub resource_list: Vec<Data>,
    #[prost(string, tag = "5")]
    pub url_format: String,
}

/// One object entry
#[derive(Clone, PartialEq, Message)]
pub struct Data {
    #[prost(int32, tag = "1")]
    pub id: i32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(int32, tag = "4")]
    pub size: i32,
    #[prost(uint32, tag = "5")]
    pub crc: u32,
    #[prost(int32, repeated, tag = "8")]
    pub dependencies: Vec<i32>,
    #[prost(enumeration = "State", tag = "9")]
    pub state: i32,
    #[prost(string, tag = "10")]
    pub md5: String,
    #[prost(string, tag = "11")]
    pub object_name: String,
    #[prost(uint64, tag = "12")]
    pub generation: u64,
    #[prost(int32, tag = "13")]
    pub upload_version_id: i32,
}

/// Wire lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum State {
    None = 0,
    Add = 1,
    Update = 2,
    Latest = 3,
    Delete = 4,
}

impl Database {
    /// Decode from protobuf bytes
    ///
    /// # Errors
    /// Returns `prost::DecodeError` on malformed input
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(bytes)
    }

    /// Encode to protobuf bytes
    #[must_use]
    pub fn encode_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Document form; an empty `urlFormat` means the field was absent
    #[must_use]
    pub fn into_document(self) -> ManifestDocument {
        ManifestDocument {
            revision: RevisionRepr::Bare(self.revision),
            asset_bundle_list: Some(self.asset_bundle_list.into_iter().map(Data::into_document).collect()),
            resource_list: Some(self.resource_list.into_iter().map(Data::into_document).collect()),
            url_format: (!self.url_format.is_empty()).then_some(self.url_format),
        }
    }
}

impl Data {
    /// Raw record form
    ///
    /// Unknown state values are kept verbatim so validation can reject them.
    #[must_use]
    pub fn into_document(self) -> RecordDocument {
        let state = match ObjectState::from_i32(self.state) {
            Some(ObjectState::None) => None,
            Some(state) => Some(state.as_str().to_string()),
            None => Some(self.state.to_string()),
        };
        RecordDocument {
            id: self.id,
            name: self.name,
            size: i64::from(self.size),
            crc: self.crc,
            dependencies: self.dependencies,
            state,
            md5: self.md5,
            object_name: self.object_name,
            generation: Generation(self.generation),
            // proto3 cannot tell 0 from absent
            upload_version_id: (self.upload_version_id != 0).then_some(self.upload_version_id),
        }
    }

    /// Wire entry from a raw record
    ///
    /// Sizes beyond `i32::MAX` saturate; the wire form cannot carry them.
    #[must_use]
    pub fn from_document(doc: &RecordDocument) -> Self {
        let state = doc
            .state
            .as_deref()
            .and_then(|s| s.parse::<ObjectState>().ok())
            .unwrap_or_default();
        Self {
            id: doc.id,
            name: doc.name.clone(),
            size: i32::try_from(doc.size).unwrap_or(i32::MAX),
            crc: doc.crc,
            dependencies: doc.dependencies.clone(),
            state: state.as_i32(),
            md5: doc.md5.clone(),
            object_name: doc.object_name.clone(),
            generation: doc.generation.0,
            upload_version_id: doc.upload_version_id.unwrap_or(0),
        }
    }
}
