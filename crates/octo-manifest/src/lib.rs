//! Octo Manifest
//!
//! Versioned inventories of remotely hosted assets, with a revision
//! algebra for diffing and merging them.
//!
//! # Core Concepts
//!
//! - [`Revision`]: `(this, base)` pair; `base == 0` is a full snapshot
//! - [`ObjectRecord`]: immutable metadata for one asset
//! - [`ObjectIndex`]: id-ordered records with lookup by id and name
//! - [`ManifestStore`]: revision + bundle index + resource index + URL template
//! - [`Decryptor`]: AES-CBC unwrap for encrypted manifests
//! - [`load_bytes`]: ordered JSON / wire / encrypted-wire loader
//!
//! # Example
//!
//! ```rust,ignore
//! use octo_manifest::{load_path, ExportFormat};
//!
//! let old = load_path("v7.json", 0, None)?.into_inner();
//! let new = load_path("octocacheevai", 0, Some(&decryptor))?.into_inner();
//!
//! let diff = new.diff(&old)?;
//! diff.export_to_path("v12-diff-v7.json", ExportFormat::Infer)?;
//! assert_eq!(diff.merge(&old)?, new);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod checksum;
mod decrypt;
mod error;
mod index;
mod load;
mod record;
mod revision;
mod store;
mod template;

/// Structured (JSON) document form
pub mod document;
/// Binary (protobuf) wire form
pub mod wire;

// Re-exports
pub use checksum::{Checksum, ChecksumError};
pub use decrypt::{Decryptor, KeyDerivation, BLOCK_SIZE};
pub use error::{DecryptError, ManifestError, Result, ValidationError};
pub use index::{IndexError, IndexKey, ObjectIndex};
pub use load::{load_bytes, load_path, DIGEST_HEADER_LEN};
pub use record::{
    CanonicalForm, ComparisonPolicy, ObjectRecord, ObjectState, RecordField, RecordKind,
    BUNDLE_SUFFIX,
};
pub use revision::{Revision, RevisionError, RevisionRepr};
pub use store::{ExportFormat, Loaded, ManifestStore, ManifestWarning};
pub use template::UrlTemplate;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
