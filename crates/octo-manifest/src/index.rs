//! Dual-keyed record index
//!
//! Provides [`ObjectIndex`], an id-ordered collection of records of one
//! [`RecordKind`] with O(1) lookup by id and by name.
//!
//! Set operations:
//! - [`ObjectIndex::difference`]: records of `self` absent from, or changed
//!   relative to, `other` (matched by name)
//! - [`ObjectIndex::union`]: id-keyed overlay where `other` wins on collision

use crate::record::{ComparisonPolicy, ObjectRecord, RecordKind};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};

/// Lookup key for [`ObjectIndex::get`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKey<'a> {
    /// Numeric record id
    Id(i32),
    /// Record name
    Name(&'a str),
}

impl From<i32> for IndexKey<'_> {
    fn from(value: i32) -> Self {
        Self::Id(value)
    }
}

impl<'a> From<&'a str> for IndexKey<'a> {
    fn from(value: &'a str) -> Self {
        Self::Name(value)
    }
}

impl Display for IndexKey<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Name(name) => write!(f, "name '{name}'"),
        }
    }
}

/// Id-ordered, dual-indexed record collection
///
/// # Invariants
/// - records are sorted by id
/// - ids and names are each unique
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIndex {
    kind: RecordKind,
    records: Vec<ObjectRecord>,
    by_id: HashMap<i32, usize>,
    by_name: HashMap<String, usize>,
}

impl ObjectIndex {
    /// Build an index, sorting by id
    ///
    /// # Errors
    /// Returns `IndexError::DuplicateKey` on an id or name collision
    pub fn new(kind: RecordKind, mut records: Vec<ObjectRecord>) -> Result<Self, IndexError> {
        records.sort_by_key(ObjectRecord::id);

        let mut by_id = HashMap::with_capacity(records.len());
        let mut by_name = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if by_id.insert(record.id(), pos).is_some() {
                return Err(IndexError::duplicate(kind, IndexKey::Id(record.id())));
            }
            if by_name.insert(record.name().to_string(), pos).is_some() {
                return Err(IndexError::duplicate(kind, IndexKey::Name(record.name())));
            }
        }

        Ok(Self {
            kind,
            records,
            by_id,
            by_name,
        })
    }

    /// Empty index of `kind`
    #[inline]
    #[must_use]
    pub fn empty(kind: RecordKind) -> Self {
        Self {
            kind,
            records: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Look up a record by id or name
    ///
    /// # Errors
    /// Returns `IndexError::NotFound` if no record has that key
    pub fn get<'k>(&self, key: impl Into<IndexKey<'k>>) -> Result<&ObjectRecord, IndexError> {
        let key = key.into();
        let pos = match key {
            IndexKey::Id(id) => self.by_id.get(&id),
            IndexKey::Name(name) => self.by_name.get(name),
        };
        pos.map(|&p| &self.records[p])
            .ok_or_else(|| IndexError::NotFound {
                kind: self.kind,
                key: key.to_string(),
            })
    }

    /// Whether a record with `name` exists
    #[inline]
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Records in id order
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, ObjectRecord> {
        self.records.iter()
    }

    /// Records in id order
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[ObjectRecord] {
        &self.records
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record kind held by this index
    #[inline]
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Records of `self` with no same-named, identical record in `other`
    ///
    /// Compares every field. See [`ObjectIndex::difference_with`].
    ///
    /// # Errors
    /// Returns `IndexError::KindMismatch` if the kinds differ
    pub fn difference(&self, other: &Self) -> Result<Self, IndexError> {
        self.difference_with(other, &ComparisonPolicy::all_fields())
    }

    /// Records of `self` with no same-named record in `other` whose
    /// canonical form under `policy` is equal
    ///
    /// # Errors
    /// Returns `IndexError::KindMismatch` if the kinds differ
    pub fn difference_with(
        &self,
        other: &Self,
        policy: &ComparisonPolicy,
    ) -> Result<Self, IndexError> {
        self.check_kind(other)?;

        let kept = self
            .records
            .iter()
            .filter(|record| match other.by_name.get(record.name()) {
                None => true,
                Some(&p) => {
                    record.canonical_form(policy) != other.records[p].canonical_form(policy)
                }
            })
            .cloned()
            .collect();

        // a subset of a valid index stays valid
        Self::new(self.kind, kept)
    }

    /// Id-keyed overlay of `other` onto `self`
    ///
    /// `other` wins on id collision; callers decide which operand is newer.
    ///
    /// # Errors
    /// Returns `IndexError::KindMismatch` if the kinds differ, or
    /// `IndexError::DuplicateKey` if the overlay leaves one name on two ids
    pub fn union(&self, other: &Self) -> Result<Self, IndexError> {
        self.check_kind(other)?;

        let mut merged: BTreeMap<i32, &ObjectRecord> =
            self.records.iter().map(|r| (r.id(), r)).collect();
        for record in &other.records {
            merged.insert(record.id(), record);
        }

        Self::new(self.kind, merged.into_values().cloned().collect())
    }

    fn check_kind(&self, other: &Self) -> Result<(), IndexError> {
        if self.kind == other.kind {
            Ok(())
        } else {
            Err(IndexError::KindMismatch {
                left: self.kind,
                right: other.kind,
            })
        }
    }
}

impl<'a> IntoIterator for &'a ObjectIndex {
    type Item = &'a ObjectRecord;
    type IntoIter = std::slice::Iter<'a, ObjectRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Index errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// Id or name appears twice
    #[error("duplicate {kind} {key}")]
    DuplicateKey { kind: RecordKind, key: String },

    /// No record with that key
    #[error("{kind} with {key} not found")]
    NotFound { kind: RecordKind, key: String },

    /// Set operation across different record kinds
    #[error("cannot combine {left} index with {right} index")]
    KindMismatch { left: RecordKind, right: RecordKind },
}

impl IndexError {
    fn duplicate(kind: RecordKind, key: IndexKey<'_>) -> Self {
        Self::DuplicateKey {
            kind,
            key: key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Checksum;
    use crate::document::{Generation, RecordDocument};
    use proptest::prelude::*;

    fn record(id: i32, name: &str, payload: &[u8]) -> ObjectRecord {
        ObjectRecord::from_document(RecordDocument {
            id,
            name: name.to_string(),
            size: i64::try_from(payload.len()).unwrap(),
            crc: 0,
            dependencies: Vec::new(),
            state: None,
            md5: Checksum::compute(payload).to_string(),
            object_name: format!("key{id}"),
            generation: Generation(1),
            upload_version_id: None,
        })
        .unwrap()
    }

    fn index(records: Vec<ObjectRecord>) -> ObjectIndex {
        ObjectIndex::new(RecordKind::Resource, records).unwrap()
    }

    #[test]
    fn new_sorts_by_id() {
        let idx = index(vec![record(3, "c", b"c"), record(1, "a", b"a"), record(2, "b", b"b")]);
        let ids: Vec<_> = idx.iter().map(ObjectRecord::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn new_rejects_duplicates() {
        let dup_id = ObjectIndex::new(RecordKind::Bundle, vec![record(1, "a", b""), record(1, "b", b"")]);
        assert!(matches!(dup_id, Err(IndexError::DuplicateKey { .. })));

        let dup_name = ObjectIndex::new(RecordKind::Bundle, vec![record(1, "a", b""), record(2, "a", b"")]);
        assert_eq!(
            dup_name.unwrap_err(),
            IndexError::DuplicateKey {
                kind: RecordKind::Bundle,
                key: "name 'a'".to_string(),
            }
        );
    }

    #[test]
    fn get_by_id_and_name_agree() {
        let idx = index(vec![record(5, "img_x", b"x"), record(9, "img_y", b"y")]);
        assert_eq!(idx.get(9).unwrap(), idx.get("img_y").unwrap());
        assert!(matches!(idx.get(7), Err(IndexError::NotFound { .. })));
        assert!(matches!(idx.get("nope"), Err(IndexError::NotFound { .. })));
        assert!(idx.contains_name("img_x"));
    }

    #[test]
    fn difference_keeps_new_and_changed() {
        let old = index(vec![record(1, "a", b"a"), record(2, "b", b"b")]);
        let new = index(vec![record(1, "a", b"a"), record(2, "b", b"b2"), record(3, "c", b"c")]);
        let d = new.difference(&old).unwrap();
        let names: Vec<_> = d.iter().map(ObjectRecord::name).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn union_prefers_other_on_id_collision() {
        let base = index(vec![record(1, "a", b"old"), record(2, "b", b"b")]);
        let patch = index(vec![record(1, "a", b"new")]);
        let merged = base.union(&patch).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(merged.get(1).unwrap().checksum().matches(b"new"));
    }

    #[test]
    fn union_rejects_name_collision_across_ids() {
        let left = index(vec![record(1, "a", b"")]);
        let right = index(vec![record(2, "a", b"")]);
        assert!(matches!(left.union(&right), Err(IndexError::DuplicateKey { .. })));
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let bundles = ObjectIndex::empty(RecordKind::Bundle);
        let resources = ObjectIndex::empty(RecordKind::Resource);
        assert_eq!(
            bundles.difference(&resources).unwrap_err(),
            IndexError::KindMismatch {
                left: RecordKind::Bundle,
                right: RecordKind::Resource,
            }
        );
        assert!(bundles.union(&resources).is_err());
    }

    fn arb_index() -> impl Strategy<Value = ObjectIndex> {
        proptest::collection::btree_map(1i32..60, proptest::collection::vec(any::<u8>(), 0..4), 0..20)
            .prop_map(|entries| {
                index(
                    entries
                        .into_iter()
                        .map(|(id, payload)| record(id, &format!("obj_{id}"), &payload))
                        .collect(),
                )
            })
    }

    proptest! {
        #[test]
        fn prop_difference_with_empty_is_identity(x in arb_index()) {
            let empty = ObjectIndex::empty(RecordKind::Resource);
            prop_assert_eq!(x.difference(&empty).unwrap(), x);
        }

        #[test]
        fn prop_difference_with_self_is_empty(x in arb_index()) {
            prop_assert!(x.difference(&x).unwrap().is_empty());
        }

        #[test]
        fn prop_difference_then_union_recovers(x in arb_index(), y in arb_index()) {
            let restored = x.difference(&y).unwrap();
            let restored = y.union(&restored).unwrap();
            for record in &x {
                prop_assert_eq!(restored.get(record.id()).unwrap(), record);
            }
        }

        #[test]
        fn prop_lookup_by_id_and_name_agree(x in arb_index()) {
            for record in &x {
                prop_assert_eq!(x.get(record.id()).unwrap(), x.get(record.name()).unwrap());
            }
        }
    }
}
