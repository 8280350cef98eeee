//! Manifest revisions
//!
//! A [`Revision`] is a `(this, base)` pair. `base == 0` denotes a complete
//! snapshot at `this`; `base > 0` denotes a diff that, applied on top of
//! `base`, yields `this`.
//!
//! Revisions form a deliberately narrow partial order: two revisions can be
//! differenced or summed only when they share `this` or share `base`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};

/// A manifest revision `this`, optionally relative to `base`
///
/// # Invariants
/// - `this > 0`
/// - `base >= 0`
/// - `this > base`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Revision {
    this: i32,
    base: i32,
}

impl Revision {
    /// Create a revision, validating the invariants
    ///
    /// # Errors
    /// Returns `RevisionError::InvalidRevision` unless `this > 0`,
    /// `base >= 0` and `this > base`
    pub fn new(this: i32, base: i32) -> Result<Self, RevisionError> {
        if this > 0 && base >= 0 && this > base {
            Ok(Self { this, base })
        } else {
            Err(RevisionError::InvalidRevision { this, base })
        }
    }

    /// Create a complete snapshot revision
    ///
    /// # Errors
    /// Returns `RevisionError::InvalidRevision` if `this <= 0`
    #[inline]
    pub fn snapshot(this: i32) -> Result<Self, RevisionError> {
        Self::new(this, 0)
    }

    /// Revision number of this state
    #[inline]
    #[must_use]
    pub const fn this(&self) -> i32 {
        self.this
    }

    /// Revision number this state diffs against (0 for snapshots)
    #[inline]
    #[must_use]
    pub const fn base(&self) -> i32 {
        self.base
    }

    /// Whether this revision is a diff rather than a snapshot
    #[inline]
    #[must_use]
    pub const fn is_diff(&self) -> bool {
        self.base != 0
    }

    /// Revision describing the changes between `self` and `other`
    ///
    /// | case                                         | result               |
    /// |----------------------------------------------|----------------------|
    /// | `self.this == other.this && self.base < other.base` | `(other.base, self.base)` |
    /// | `self.this > other.this && self.base == other.base` | `(self.this, other.this)` |
    /// | anything else                                | incomparable         |
    ///
    /// # Errors
    /// Returns `RevisionError::IncomparableRevisions` outside the two valid cases
    pub fn difference(&self, other: &Self) -> Result<Self, RevisionError> {
        if self.this == other.this && self.base < other.base {
            return Self::new(other.base, self.base);
        }
        if self.this > other.this && self.base == other.base {
            return Self::new(self.this, other.this);
        }

        let reason = if self == other {
            "revisions are identical"
        } else if self.this != other.this && self.base != other.base {
            "revisions share neither 'this' nor 'base'"
        } else if self.this == other.this {
            "base of the subtrahend must be newer"
        } else {
            "this of the minuend must be newer"
        };
        Err(RevisionError::incomparable(*self, *other, reason))
    }

    /// Revision obtained by applying a diff onto the state it is based on
    ///
    /// Operand order does not matter: the operand with the lower `this`
    /// must be the base of the one with the higher `this`.
    ///
    /// # Errors
    /// Returns `RevisionError::IncomparableRevisions` if both operands share
    /// `this`, or if the lower operand's `this` is not the higher one's `base`
    pub fn sum(&self, other: &Self) -> Result<Self, RevisionError> {
        if self.this == other.this {
            return Err(RevisionError::incomparable(
                *self,
                *other,
                "cannot add revisions with identical 'this'",
            ));
        }

        let (lower, higher) = if self.this < other.this {
            (self, other)
        } else {
            (other, self)
        };

        if lower.this != higher.base {
            return Err(RevisionError::incomparable(
                *self,
                *other,
                "lower revision is not the base of the higher one",
            ));
        }

        Self::new(higher.this, lower.base)
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.base == 0 {
            write!(f, "v{}", self.this)
        } else {
            write!(f, "v{}-diff-v{}", self.this, self.base)
        }
    }
}

/// Canonical form: a bare integer for snapshots, `[this, base]` for diffs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RevisionRepr {
    /// Complete snapshot, or a diff whose base is supplied separately
    Bare(i32),
    /// Diff form
    Pair([i32; 2]),
}

impl RevisionRepr {
    /// `(this, base)` carried by this representation
    #[inline]
    #[must_use]
    pub const fn parts(self) -> (i32, i32) {
        match self {
            Self::Bare(this) => (this, 0),
            Self::Pair([this, base]) => (this, base),
        }
    }
}

impl From<Revision> for RevisionRepr {
    fn from(value: Revision) -> Self {
        if value.base == 0 {
            Self::Bare(value.this)
        } else {
            Self::Pair([value.this, value.base])
        }
    }
}

impl TryFrom<RevisionRepr> for Revision {
    type Error = RevisionError;

    fn try_from(value: RevisionRepr) -> Result<Self, Self::Error> {
        let (this, base) = value.parts();
        Self::new(this, base)
    }
}

impl Serialize for Revision {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        RevisionRepr::from(*self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = RevisionRepr::deserialize(deserializer)?;
        Self::try_from(repr).map_err(serde::de::Error::custom)
    }
}

/// Revision errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevisionError {
    /// Construction invariant violated
    #[error("invalid revision (this={this}, base={base}): require this > 0, base >= 0, this > base")]
    InvalidRevision { this: i32, base: i32 },

    /// Diff/merge precondition violated
    #[error("incomparable revisions {left} and {right}: {reason}")]
    IncomparableRevisions {
        left: Revision,
        right: Revision,
        reason: &'static str,
    },
}

impl RevisionError {
    fn incomparable(left: Revision, right: Revision, reason: &'static str) -> Self {
        Self::IncomparableRevisions {
            left,
            right,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rev(this: i32, base: i32) -> Revision {
        Revision::new(this, base).unwrap()
    }

    #[test]
    fn construction_boundaries() {
        assert!(Revision::new(1, 0).is_ok());
        assert!(Revision::new(2, 1).is_ok());
        assert!(Revision::new(0, 0).is_err());
        assert!(Revision::new(-1, 0).is_err());
        assert!(Revision::new(5, 5).is_err());
        assert!(Revision::new(5, 6).is_err());
        assert!(Revision::new(5, -1).is_err());
        assert!(matches!(
            Revision::new(0, 0),
            Err(RevisionError::InvalidRevision { this: 0, base: 0 })
        ));
    }

    #[test]
    fn difference_of_snapshots() {
        let a = rev(12, 0);
        let b = rev(7, 0);
        assert_eq!(a.difference(&b).unwrap(), rev(12, 7));
    }

    #[test]
    fn difference_sharing_this() {
        let a = rev(12, 3);
        let b = rev(12, 7);
        assert_eq!(a.difference(&b).unwrap(), rev(7, 3));
    }

    #[test]
    fn difference_rejects_incomparable() {
        assert!(rev(12, 0).difference(&rev(12, 0)).is_err());
        assert!(rev(7, 0).difference(&rev(12, 0)).is_err());
        assert!(rev(12, 7).difference(&rev(12, 3)).is_err());
        assert!(rev(12, 3).difference(&rev(9, 2)).is_err());
    }

    #[test]
    fn sum_restores_snapshot() {
        let a = rev(12, 0);
        let b = rev(7, 0);
        let d = a.difference(&b).unwrap();
        assert_eq!(d.sum(&b).unwrap(), a);
        assert_eq!(b.sum(&d).unwrap(), a);
    }

    #[test]
    fn sum_rejects_unrelated() {
        assert!(rev(12, 7).sum(&rev(8, 0)).is_err());
        assert!(rev(12, 7).sum(&rev(12, 0)).is_err());
    }

    #[test]
    fn display_forms() {
        assert_eq!(rev(12, 0).to_string(), "v12");
        assert_eq!(rev(12, 7).to_string(), "v12-diff-v7");
    }

    #[test]
    fn serde_canonical_forms() {
        assert_eq!(serde_json::to_string(&rev(12, 0)).unwrap(), "12");
        assert_eq!(serde_json::to_string(&rev(12, 7)).unwrap(), "[12,7]");
        assert_eq!(serde_json::from_str::<Revision>("12").unwrap(), rev(12, 0));
        assert_eq!(serde_json::from_str::<Revision>("[12,7]").unwrap(), rev(12, 7));
        assert!(serde_json::from_str::<Revision>("[7,12]").is_err());
    }

    proptest! {
        #[test]
        fn prop_construction_matches_invariant(this in -5i32..50, base in -5i32..50) {
            let ok = this > 0 && base >= 0 && this > base;
            prop_assert_eq!(Revision::new(this, base).is_ok(), ok);
        }

        #[test]
        fn prop_difference_then_sum_round_trips(older in 1i32..1000, gap in 1i32..1000) {
            let b = rev(older, 0);
            let a = rev(older + gap, 0);
            let d = a.difference(&b).unwrap();
            prop_assert_eq!(d, rev(older + gap, older));
            prop_assert_eq!(d.sum(&b).unwrap(), a);
        }
    }
}
