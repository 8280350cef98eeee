//! Object records
//!
//! An [`ObjectRecord`] is the immutable metadata for one remotely hosted
//! asset. Records are only ever created by validating a [`RecordDocument`]
//! (decoded from JSON or from the wire form) and are never mutated.

use crate::checksum::Checksum;
use crate::document::RecordDocument;
use crate::error::ValidationError;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Suffix given on disk (and in tabular export) to bundle names without extension
pub const BUNDLE_SUFFIX: &str = ".unity3d";

/// The two record kinds tracked in parallel indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    /// Asset bundle; carries dependency edges
    Bundle,
    /// Plain resource
    Resource,
}

impl RecordKind {
    /// Tag substituted for `{type}` in URL templates
    #[inline]
    #[must_use]
    pub const fn url_tag(self) -> &'static str {
        match self {
            Self::Bundle => "assetbundle",
            Self::Resource => "resources",
        }
    }

    /// Short prefix used in log labels
    #[inline]
    #[must_use]
    pub const fn label_prefix(self) -> &'static str {
        match self {
            Self::Bundle => "AB",
            Self::Resource => "RS",
        }
    }
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundle => f.write_str("bundle"),
            Self::Resource => f.write_str("resource"),
        }
    }
}

/// Lifecycle state carried by records (not acted upon)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ObjectState {
    /// Unspecified
    #[default]
    None,
    /// Newly added
    Add,
    /// Updated
    Update,
    /// Latest
    Latest,
    /// Deleted
    Delete,
}

impl ObjectState {
    /// Upper-case name used by the document form
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Add => "ADD",
            Self::Update => "UPDATE",
            Self::Latest => "LATEST",
            Self::Delete => "DELETE",
        }
    }

    /// Numeric value used by the wire form
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Add => 1,
            Self::Update => 2,
            Self::Latest => 3,
            Self::Delete => 4,
        }
    }

    /// Parse a wire value
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Add),
            2 => Some(Self::Update),
            3 => Some(Self::Latest),
            4 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl FromStr for ObjectState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Self::None),
            "ADD" => Ok(Self::Add),
            "UPDATE" => Ok(Self::Update),
            "LATEST" => Ok(Self::Latest),
            "DELETE" => Ok(Self::Delete),
            _ => Err(()),
        }
    }
}

impl Display for ObjectState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable metadata for one asset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRecord {
    id: i32,
    name: String,
    object_key: String,
    size: u64,
    checksum: Checksum,
    generation: u64,
    dependencies: Vec<i32>,
    state: ObjectState,
    upload_version: Option<i32>,
    crc: u32,
}

impl ObjectRecord {
    /// Validate a raw record
    ///
    /// # Errors
    /// Returns `ValidationError` for a non-positive id, empty name, negative
    /// size, malformed checksum or unknown state
    pub fn from_document(doc: RecordDocument) -> Result<Self, ValidationError> {
        let id = doc.id;
        if id <= 0 {
            return Err(ValidationError::NonPositiveId(id));
        }
        if doc.name.is_empty() {
            return Err(ValidationError::EmptyName { id });
        }
        let size = u64::try_from(doc.size).map_err(|_| ValidationError::NegativeSize {
            id,
            size: doc.size,
        })?;
        let checksum = doc
            .md5
            .parse::<Checksum>()
            .map_err(|e| ValidationError::MalformedChecksum {
                id,
                value: doc.md5.clone(),
                reason: e.to_string(),
            })?;
        let state = match doc.state.as_deref() {
            None => ObjectState::None,
            Some(s) => s.parse().map_err(|()| ValidationError::UnknownState {
                id,
                value: s.to_string(),
            })?,
        };

        Ok(Self {
            id,
            name: doc.name,
            object_key: doc.object_name,
            size,
            checksum,
            generation: doc.generation.0,
            dependencies: doc.dependencies,
            state,
            upload_version: doc.upload_version_id,
            crc: doc.crc,
        })
    }

    /// Raw document form of this record
    #[must_use]
    pub fn to_document(&self) -> RecordDocument {
        RecordDocument {
            id: self.id,
            name: self.name.clone(),
            size: i64::try_from(self.size).unwrap_or(i64::MAX),
            crc: self.crc,
            dependencies: self.dependencies.clone(),
            state: (self.state != ObjectState::None).then(|| self.state.as_str().to_string()),
            md5: self.checksum.to_string(),
            object_name: self.object_key.clone(),
            generation: self.generation.into(),
            upload_version_id: self.upload_version,
        }
    }

    /// Unique positive id
    #[inline]
    #[must_use]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Unique human-readable name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque server-side object key
    #[inline]
    #[must_use]
    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    /// Declared payload size in bytes
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Declared payload digest
    #[inline]
    #[must_use]
    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// Server-side generation
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Dependency ids (bundles only)
    #[inline]
    #[must_use]
    pub fn dependencies(&self) -> &[i32] {
        &self.dependencies
    }

    /// Lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ObjectState {
        self.state
    }

    /// Declared upload version, if any
    #[inline]
    #[must_use]
    pub fn upload_version(&self) -> Option<i32> {
        self.upload_version
    }

    /// Upload version, defaulting to the owning manifest's version
    #[inline]
    #[must_use]
    pub fn upload_version_or(&self, manifest_version: i32) -> i32 {
        self.upload_version.unwrap_or(manifest_version)
    }

    /// CRC as declared by the server (scheme unknown, unused)
    #[inline]
    #[must_use]
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// File name on disk; extensionless bundle names receive [`BUNDLE_SUFFIX`]
    #[must_use]
    pub fn file_name(&self, kind: RecordKind) -> String {
        if kind == RecordKind::Bundle && !self.name.contains('.') {
            format!("{}{BUNDLE_SUFFIX}", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Log label, e.g. `AB[00042] 'img_general_icon'`
    #[must_use]
    pub fn label(&self, kind: RecordKind) -> String {
        format!("{}[{:05}] '{}'", kind.label_prefix(), self.id, self.name)
    }

    /// Comparison view used when diffing indexes
    #[must_use]
    pub fn canonical_form(&self, policy: &ComparisonPolicy) -> CanonicalForm<'_> {
        let keep = |field| !policy.ignores(field);
        CanonicalForm {
            id: keep(RecordField::Id).then_some(self.id),
            name: keep(RecordField::Name).then_some(self.name.as_str()),
            object_key: keep(RecordField::ObjectKey).then_some(self.object_key.as_str()),
            size: keep(RecordField::Size).then_some(self.size),
            checksum: keep(RecordField::Checksum).then_some(self.checksum),
            generation: keep(RecordField::Generation).then_some(self.generation),
            dependencies: keep(RecordField::Dependencies).then_some(self.dependencies.as_slice()),
            state: keep(RecordField::State).then_some(self.state),
            upload_version: keep(RecordField::UploadVersion).then_some(self.upload_version),
            crc: keep(RecordField::Crc).then_some(self.crc),
        }
    }
}

/// Record fields, as addressed by a [`ComparisonPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordField {
    Id,
    Name,
    ObjectKey,
    Size,
    Checksum,
    Generation,
    Dependencies,
    State,
    UploadVersion,
    Crc,
}

/// Which fields participate in canonical comparison
///
/// The default compares every field. Volatile fields can be excluded
/// without touching the diff algorithm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonPolicy {
    ignored: BTreeSet<RecordField>,
}

impl ComparisonPolicy {
    /// Compare every field
    #[inline]
    #[must_use]
    pub fn all_fields() -> Self {
        Self::default()
    }

    /// Additionally exclude `field` from comparison
    #[inline]
    #[must_use]
    pub fn ignoring(mut self, field: RecordField) -> Self {
        self.ignored.insert(field);
        self
    }

    /// Whether `field` is excluded
    #[inline]
    #[must_use]
    pub fn ignores(&self, field: RecordField) -> bool {
        self.ignored.contains(&field)
    }
}

/// Field-wise comparable view of a record; excluded fields are `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalForm<'a> {
    id: Option<i32>,
    name: Option<&'a str>,
    object_key: Option<&'a str>,
    size: Option<u64>,
    checksum: Option<Checksum>,
    generation: Option<u64>,
    dependencies: Option<&'a [i32]>,
    state: Option<ObjectState>,
    upload_version: Option<Option<i32>>,
    crc: Option<u32>,
}
