//! Manifest store
//!
//! A [`ManifestStore`] owns a [`Revision`], one [`ObjectIndex`] per record
//! kind and the [`UrlTemplate`] used to fetch objects. Stores are values:
//! diff and merge build new stores, never mutate their operands.
//!
//! Non-fatal conditions (a base revision override, a lossy export) are
//! logged and also returned alongside the value as [`ManifestWarning`]s.

use crate::document::{ManifestDocument, RecordDocument};
use crate::error::{ManifestError, Result};
use crate::index::{IndexError, IndexKey, ObjectIndex};
use crate::record::{ObjectRecord, RecordKind};
use crate::revision::{Revision, RevisionRepr};
use crate::template::UrlTemplate;
use crate::wire::{Data, Database};
use regex::RegexBuilder;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// Value produced together with non-fatal warnings
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub warnings: Vec<ManifestWarning>,
}

impl<T> Loaded<T> {
    /// Wrap a value with no warnings
    #[inline]
    #[must_use]
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Discard warnings
    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Transform the value, keeping warnings
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loaded<U> {
        Loaded {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    fn warn(&mut self, warning: ManifestWarning) {
        tracing::warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// Non-fatal manifest conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestWarning {
    /// An embedded base revision was replaced by the caller's override
    BaseOverridden { embedded: i32, applied: i32 },
    /// A diff was exported to the wire form, which cannot carry its base
    LossyWireExport { revision: Revision },
    /// Export path extension not recognized; the wire form was used
    UnknownExtension { path: String },
    /// Export format does not match the path extension
    ExtensionMismatch { path: String, format: ExportFormat },
}

impl Display for ManifestWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::BaseOverridden { embedded, applied } => write!(
                f,
                "overriding embedded base revision v{embedded} with specified v{applied}"
            ),
            Self::LossyWireExport { revision } => write!(
                f,
                "exporting diff manifest {revision} to the wire form, base revision lost"
            ),
            Self::UnknownExtension { path } => {
                write!(f, "unrecognized extension on '{path}', defaulting to wire form")
            }
            Self::ExtensionMismatch { path, format } => {
                write!(f, "writing {format} into '{path}' (extension does not match)")
            }
        }
    }
}

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    /// Protobuf wire form (`.pdb`)
    Wire,
    /// Structured JSON document (`.json`)
    Json,
    /// Flattened table (`.csv`)
    Csv,
    /// Decide from the destination extension
    Infer,
}

impl ExportFormat {
    /// Format implied by a path extension
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "pdb" => Some(Self::Wire),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Wire => "wire",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Infer => "infer",
        })
    }
}

/// One row of the tabular export
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableRow<'a> {
    object_name: &'a str,
    md5: String,
    name: String,
    size: u64,
    state: &'static str,
}

/// Versioned manifest: revision, two record indexes and a URL template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestStore {
    revision: Revision,
    bundles: ObjectIndex,
    resources: ObjectIndex,
    url_template: UrlTemplate,
}

impl ManifestStore {
    /// Assemble a store from validated parts
    ///
    /// # Errors
    /// Returns `ManifestError::Index` if either index holds the wrong kind
    pub fn new(
        revision: Revision,
        bundles: ObjectIndex,
        resources: ObjectIndex,
        url_template: UrlTemplate,
    ) -> Result<Self> {
        for (expected, index) in [(RecordKind::Bundle, &bundles), (RecordKind::Resource, &resources)] {
            if index.kind() != expected {
                return Err(IndexError::KindMismatch {
                    left: expected,
                    right: index.kind(),
                }
                .into());
            }
        }
        Ok(Self {
            revision,
            bundles,
            resources,
            url_template,
        })
    }

    /// Build from a structured document
    ///
    /// A nonzero `base_override` replaces the embedded base revision; a
    /// conflicting nonzero embedded base produces a warning. Absent record
    /// lists are treated as empty.
    ///
    /// # Errors
    /// Returns `MissingField` without a URL template, or a validation,
    /// revision or index error for malformed content
    pub fn from_document(doc: ManifestDocument, base_override: i32) -> Result<Loaded<Self>> {
        let (this, mut base) = doc.revision.parts();
        let mut warnings = Vec::new();
        if base_override != 0 {
            if base != 0 && base != base_override {
                let warning = ManifestWarning::BaseOverridden {
                    embedded: base,
                    applied: base_override,
                };
                tracing::warn!("{}", warning);
                warnings.push(warning);
            }
            base = base_override;
        }

        let revision = Revision::new(this, base)?;
        let url_template = doc.url_format.ok_or(ManifestError::MissingField("urlFormat"))?;
        let bundles = build_index(RecordKind::Bundle, doc.asset_bundle_list)?;
        let resources = build_index(RecordKind::Resource, doc.resource_list)?;

        let store = Self::new(revision, bundles, resources, url_template.into())?;
        tracing::info!("Loaded manifest {}", store);
        Ok(Loaded {
            value: store,
            warnings,
        })
    }

    /// Build from protobuf bytes
    ///
    /// # Errors
    /// Returns `WireDecode` for malformed bytes, otherwise as
    /// [`ManifestStore::from_document`]
    pub fn from_wire(bytes: &[u8], base_override: i32) -> Result<Loaded<Self>> {
        let doc = Database::decode_bytes(bytes)?.into_document();
        Self::from_document(doc, base_override)
    }

    /// Changes in `self` relative to `other`
    ///
    /// # Errors
    /// Returns `Revision` if the revisions are incomparable
    pub fn diff(&self, other: &Self) -> Result<Self> {
        let revision = self.revision.difference(&other.revision)?;
        let store = Self {
            revision,
            bundles: self.bundles.difference(&other.bundles)?,
            resources: self.resources.difference(&other.resources)?,
            url_template: self.url_template.clone(),
        };
        tracing::info!(
            "Diffed {} against {}: {} bundles, {} resources changed",
            self.revision,
            other.revision,
            store.bundles.len(),
            store.resources.len()
        );
        Ok(store)
    }

    /// Apply a diff onto the state it is based on (operand order is free)
    ///
    /// The operand whose `this` matches the result is treated as newer and
    /// wins on id collision; its URL template is carried forward.
    ///
    /// # Errors
    /// Returns `Revision` if neither operand is the other's base, or
    /// `Index` if the overlay leaves one name on two ids
    pub fn merge(&self, other: &Self) -> Result<Self> {
        let revision = self.revision.sum(&other.revision)?;
        let (older, newer) = if revision.this() == other.revision.this() {
            (self, other)
        } else {
            (other, self)
        };
        let store = Self {
            revision,
            bundles: older.bundles.union(&newer.bundles)?,
            resources: older.resources.union(&newer.resources)?,
            url_template: newer.url_template.clone(),
        };
        tracing::info!("Merged {} onto {} into {}", newer.revision, older.revision, store.revision);
        Ok(store)
    }

    #[inline]
    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    #[inline]
    #[must_use]
    pub fn bundles(&self) -> &ObjectIndex {
        &self.bundles
    }

    #[inline]
    #[must_use]
    pub fn resources(&self) -> &ObjectIndex {
        &self.resources
    }

    /// Index holding records of `kind`
    #[inline]
    #[must_use]
    pub fn index(&self, kind: RecordKind) -> &ObjectIndex {
        match kind {
            RecordKind::Bundle => &self.bundles,
            RecordKind::Resource => &self.resources,
        }
    }

    #[inline]
    #[must_use]
    pub fn url_template(&self) -> &UrlTemplate {
        &self.url_template
    }

    /// Look up a record by name, bundles first
    ///
    /// # Errors
    /// Returns `IndexError::NotFound` if neither index has the name
    pub fn get(&self, name: &str) -> Result<(RecordKind, &ObjectRecord), IndexError> {
        if let Ok(record) = self.bundles.get(IndexKey::Name(name)) {
            return Ok((RecordKind::Bundle, record));
        }
        self.resources
            .get(IndexKey::Name(name))
            .map(|record| (RecordKind::Resource, record))
    }

    /// Whether either index has a record called `name`
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.bundles.contains_name(name) || self.resources.contains_name(name)
    }

    /// Total record count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bundles.len() + self.resources.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bundles then resources, each in id order
    pub fn iter(&self) -> impl Iterator<Item = (RecordKind, &ObjectRecord)> + '_ {
        self.bundles
            .iter()
            .map(|r| (RecordKind::Bundle, r))
            .chain(self.resources.iter().map(|r| (RecordKind::Resource, r)))
    }

    /// Records whose name matches `pattern` from its first character,
    /// case-insensitively, sorted by name
    ///
    /// # Errors
    /// Returns `Pattern` for an invalid regular expression
    pub fn search(&self, pattern: &str) -> Result<Vec<(RecordKind, &ObjectRecord)>> {
        let regex = RegexBuilder::new(&format!("^(?:{pattern})"))
            .case_insensitive(true)
            .build()?;
        let mut found: Vec<_> = self.iter().filter(|(_, r)| regex.is_match(r.name())).collect();
        found.sort_by(|(_, a), (_, b)| a.name().cmp(b.name()));
        tracing::debug!("Search '{}' matched {} records", pattern, found.len());
        Ok(found)
    }

    /// Canonical document form
    #[must_use]
    pub fn to_document(&self) -> ManifestDocument {
        let records = |index: &ObjectIndex| -> Vec<RecordDocument> {
            index.iter().map(ObjectRecord::to_document).collect()
        };
        ManifestDocument {
            revision: RevisionRepr::from(self.revision),
            asset_bundle_list: Some(records(&self.bundles)),
            resource_list: Some(records(&self.resources)),
            url_format: Some(self.url_template.as_str().to_string()),
        }
    }

    /// Render to bytes; `Infer` renders the wire form
    ///
    /// # Errors
    /// Returns `Document` or `Tabular` if serialization fails
    pub fn export(&self, format: ExportFormat) -> Result<Loaded<Vec<u8>>> {
        match format {
            ExportFormat::Wire | ExportFormat::Infer => Ok(self.export_wire()),
            ExportFormat::Json => self.export_json().map(Loaded::clean),
            ExportFormat::Csv => self.export_csv().map(Loaded::clean),
        }
    }

    /// Render and write to `path`
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be written, otherwise as
    /// [`ManifestStore::export`]
    pub fn export_to_path(&self, path: impl AsRef<Path>, format: ExportFormat) -> Result<Loaded<()>> {
        let path = path.as_ref();
        let implied = ExportFormat::from_extension(path);
        let mut pre = Loaded::clean(());

        let format = match (format, implied) {
            (ExportFormat::Infer, Some(implied)) => implied,
            (ExportFormat::Infer, None) => {
                pre.warn(ManifestWarning::UnknownExtension {
                    path: path.display().to_string(),
                });
                ExportFormat::Wire
            }
            (explicit, implied) => {
                if implied != Some(explicit) {
                    pre.warn(ManifestWarning::ExtensionMismatch {
                        path: path.display().to_string(),
                        format: explicit,
                    });
                }
                explicit
            }
        };

        let Loaded { value: bytes, warnings } = self.export(format)?;
        std::fs::write(path, bytes).map_err(|e| ManifestError::io(path, e))?;
        tracing::info!("Exported {} as {} into {}", self, format, path.display());

        pre.warnings.extend(warnings);
        Ok(pre)
    }

    fn export_wire(&self) -> Loaded<Vec<u8>> {
        let mut out = Loaded::clean(Vec::new());
        if self.revision.is_diff() {
            out.warn(ManifestWarning::LossyWireExport {
                revision: self.revision,
            });
        }
        let wire = |index: &ObjectIndex| -> Vec<Data> {
            index
                .iter()
                .map(|r| Data::from_document(&r.to_document()))
                .collect()
        };
        let db = Database {
            revision: self.revision.this(),
            asset_bundle_list: wire(&self.bundles),
            resource_list: wire(&self.resources),
            url_format: self.url_template.as_str().to_string(),
        };
        out.value = db.encode_bytes();
        out
    }

    fn export_json(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.to_document().serialize(&mut ser)?;
        Ok(buf)
    }

    fn export_csv(&self) -> Result<Vec<u8>> {
        let mut rows: Vec<TableRow<'_>> = self
            .iter()
            .map(|(kind, r)| TableRow {
                object_name: r.object_key(),
                md5: r.checksum().to_string(),
                name: r.file_name(kind),
                size: r.size(),
                state: r.state().as_str(),
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &rows {
            writer.serialize(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| ManifestError::Tabular(e.into_error().into()))
    }
}

impl Display for ManifestStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bundles, {} resources)",
            self.revision,
            self.bundles.len(),
            self.resources.len()
        )
    }
}

fn build_index(kind: RecordKind, docs: Option<Vec<RecordDocument>>) -> Result<ObjectIndex> {
    let records = docs
        .unwrap_or_default()
        .into_iter()
        .map(ObjectRecord::from_document)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ObjectIndex::new(kind, records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::document::Generation;
    use pretty_assertions::assert_eq;

    fn record_doc(id: i32, name: &str, payload: &[u8]) -> RecordDocument {
        RecordDocument {
            id,
            name: name.to_string(),
            size: i64::try_from(payload.len()).unwrap(),
            crc: 0,
            dependencies: Vec::new(),
            state: None,
            md5: Checksum::compute(payload).to_string(),
            object_name: format!("obj{id}"),
            generation: Generation(100),
            upload_version_id: None,
        }
    }

    fn document(revision: RevisionRepr, bundles: Vec<RecordDocument>, resources: Vec<RecordDocument>) -> ManifestDocument {
        ManifestDocument {
            revision,
            asset_bundle_list: Some(bundles),
            resource_list: Some(resources),
            url_format: Some("https://cdn/{type}/{o}".to_string()),
        }
    }

    fn store(this: i32, bundles: Vec<RecordDocument>, resources: Vec<RecordDocument>) -> ManifestStore {
        ManifestStore::from_document(document(RevisionRepr::Bare(this), bundles, resources), 0)
            .unwrap()
            .into_inner()
    }

    fn v7() -> ManifestStore {
        store(
            7,
            vec![record_doc(1, "img_a", b"a"), record_doc(2, "img_b", b"b")],
            vec![record_doc(1, "sud_x.awb", b"x")],
        )
    }

    fn v12() -> ManifestStore {
        store(
            12,
            vec![record_doc(1, "img_a", b"a"), record_doc(2, "img_b", b"b2"), record_doc(3, "img_c", b"c")],
            vec![record_doc(1, "sud_x.awb", b"x")],
        )
    }

    #[test]
    fn base_override_conflict_warns_and_wins() {
        let doc = document(RevisionRepr::Pair([12, 5]), vec![], vec![]);
        let loaded = ManifestStore::from_document(doc, 7).unwrap();
        assert_eq!(loaded.value.revision(), Revision::new(12, 7).unwrap());
        assert_eq!(
            loaded.warnings,
            vec![ManifestWarning::BaseOverridden { embedded: 5, applied: 7 }]
        );
    }

    #[test]
    fn base_override_on_snapshot_is_silent() {
        let doc = document(RevisionRepr::Bare(12), vec![], vec![]);
        let loaded = ManifestStore::from_document(doc, 7).unwrap();
        assert_eq!(loaded.value.revision(), Revision::new(12, 7).unwrap());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn missing_url_template_fails() {
        let mut doc = document(RevisionRepr::Bare(3), vec![], vec![]);
        doc.url_format = None;
        assert!(matches!(
            ManifestStore::from_document(doc, 0),
            Err(ManifestError::MissingField("urlFormat"))
        ));
    }

    #[test]
    fn absent_lists_are_empty() {
        let doc = ManifestDocument {
            revision: RevisionRepr::Pair([12, 7]),
            asset_bundle_list: None,
            resource_list: None,
            url_format: Some(String::new()),
        };
        let store = ManifestStore::from_document(doc, 0).unwrap().into_inner();
        assert!(store.is_empty());
    }

    #[test]
    fn diff_then_merge_restores_newer() {
        let (old, new) = (v7(), v12());
        let diff = new.diff(&old).unwrap();
        assert_eq!(diff.revision(), Revision::new(12, 7).unwrap());
        let names: Vec<_> = diff.iter().map(|(_, r)| r.name().to_string()).collect();
        assert_eq!(names, vec!["img_b", "img_c"]);

        assert_eq!(diff.merge(&old).unwrap(), new);
        assert_eq!(old.merge(&diff).unwrap(), new);
    }

    #[test]
    fn diff_of_unrelated_revisions_fails() {
        assert!(matches!(v7().diff(&v12()), Err(ManifestError::Revision(_))));
    }

    #[test]
    fn get_prefers_bundles() {
        let s = store(3, vec![record_doc(1, "same", b"b")], vec![record_doc(9, "same", b"r")]);
        let (kind, record) = s.get("same").unwrap();
        assert_eq!(kind, RecordKind::Bundle);
        assert_eq!(record.id(), 1);
        assert!(s.get("missing").is_err());
    }

    #[test]
    fn search_is_anchored_and_case_insensitive() {
        let s = v12();
        let found = s.search("IMG_[bc]").unwrap();
        let names: Vec<_> = found.iter().map(|(_, r)| r.name()).collect();
        assert_eq!(names, vec!["img_b", "img_c"]);
        assert!(s.search("mg_").unwrap().is_empty());
        assert!(matches!(s.search("("), Err(ManifestError::Pattern(_))));
    }

    #[test]
    fn wire_export_of_diff_warns() {
        let diff = v12().diff(&v7()).unwrap();
        let out = diff.export(ExportFormat::Wire).unwrap();
        assert_eq!(
            out.warnings,
            vec![ManifestWarning::LossyWireExport { revision: diff.revision() }]
        );
        let back = ManifestStore::from_wire(&out.value, 0).unwrap().into_inner();
        assert_eq!(back.revision(), Revision::new(12, 0).unwrap());
        assert_eq!(back.len(), diff.len());
    }

    #[test]
    fn json_export_round_trips() {
        let diff = v12().diff(&v7()).unwrap();
        let out = diff.export(ExportFormat::Json).unwrap();
        assert!(out.warnings.is_empty());
        let doc: ManifestDocument = serde_json::from_slice(&out.value).unwrap();
        assert_eq!(doc.revision, RevisionRepr::Pair([12, 7]));
        let back = ManifestStore::from_document(doc, 0).unwrap().into_inner();
        assert_eq!(back, diff);
    }

    #[test]
    fn csv_export_flattens_and_sorts() {
        let s = store(
            3,
            vec![record_doc(1, "zz_bundle", b"z")],
            vec![record_doc(2, "aa.txt", b"a")],
        );
        let text = String::from_utf8(s.export(ExportFormat::Csv).unwrap().value).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "objectName,md5,name,size,state");
        assert!(lines[1].contains(",aa.txt,1,NONE"));
        assert!(lines[2].contains(",zz_bundle.unity3d,1,NONE"));
    }

    #[test]
    fn export_to_path_infers_and_warns() {
        let dir = tempfile::tempdir().unwrap();
        let s = v7();

        let json = dir.path().join("m.json");
        let out = s.export_to_path(&json, ExportFormat::Infer).unwrap();
        assert!(out.warnings.is_empty());
        assert!(std::fs::read_to_string(&json).unwrap().starts_with('{'));

        let odd = dir.path().join("m.dat");
        let out = s.export_to_path(&odd, ExportFormat::Infer).unwrap();
        assert!(matches!(out.warnings[0], ManifestWarning::UnknownExtension { .. }));
        let back = ManifestStore::from_wire(&std::fs::read(&odd).unwrap(), 0).unwrap();
        assert_eq!(back.value, s);

        let mismatch = dir.path().join("m.csv");
        let out = s.export_to_path(&mismatch, ExportFormat::Json).unwrap();
        assert!(matches!(out.warnings[0], ManifestWarning::ExtensionMismatch { format: ExportFormat::Json, .. }));
    }
}
