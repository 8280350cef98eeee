//! Format-sniffing manifest loader
//!
//! Raw bytes are tried against an ordered list of decoders:
//! 1. JSON document
//! 2. plaintext wire form (skipped for JSON-looking input)
//! 3. decrypt, drop the digest header, then wire form (needs a decryptor)
//!
//! The first decoder to produce a document wins. A plaintext wire message
//! without a URL format is not accepted as a manifest. Errors found while
//! building the store from that document are returned as-is; they are not
//! a reason to try the next decoder.

use crate::decrypt::Decryptor;
use crate::document::ManifestDocument;
use crate::error::{ManifestError, Result};
use crate::store::{Loaded, ManifestStore};
use crate::wire::Database;
use std::path::Path;

/// Digest bytes preceding the plaintext of an encrypted cache file
pub const DIGEST_HEADER_LEN: usize = 16;

/// Outcome of one decoder: `None` when its precondition does not hold
type Decode = fn(&[u8], Option<&Decryptor>) -> Option<std::result::Result<ManifestDocument, String>>;

const ATTEMPTS: [(&str, Decode); 3] = [
    ("document", decode_document as Decode),
    ("wire", decode_wire as Decode),
    ("encrypted wire", decode_encrypted as Decode),
];

/// Load a manifest from bytes of unknown format
///
/// # Errors
/// Returns `Unrecognized` listing every decoder's failure if none accepts
/// the input; otherwise as [`ManifestStore::from_document`]
pub fn load_bytes(
    bytes: &[u8],
    base_override: i32,
    decryptor: Option<&Decryptor>,
) -> Result<Loaded<ManifestStore>> {
    let mut attempts = Vec::new();
    for (name, decode) in ATTEMPTS {
        match decode(bytes, decryptor) {
            None => attempts.push((name, "not applicable".to_string())),
            Some(Ok(doc)) => {
                tracing::debug!("Manifest decoded as {}", name);
                return ManifestStore::from_document(doc, base_override);
            }
            Some(Err(reason)) => {
                tracing::debug!("Manifest is not {}: {}", name, reason);
                attempts.push((name, reason));
            }
        }
    }
    Err(ManifestError::Unrecognized { attempts })
}

/// Read a file and load it with [`load_bytes`]
///
/// # Errors
/// Returns `Io` if the file cannot be read, otherwise as [`load_bytes`]
pub fn load_path(
    path: impl AsRef<Path>,
    base_override: i32,
    decryptor: Option<&Decryptor>,
) -> Result<Loaded<ManifestStore>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| ManifestError::io(path, e))?;
    tracing::info!("Loading manifest from {}", path.display());
    load_bytes(&bytes, base_override, decryptor)
}

fn looks_like_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

fn decode_document(bytes: &[u8], _: Option<&Decryptor>) -> Option<std::result::Result<ManifestDocument, String>> {
    Some(serde_json::from_slice(bytes).map_err(|e| e.to_string()))
}

fn decode_wire(bytes: &[u8], _: Option<&Decryptor>) -> Option<std::result::Result<ManifestDocument, String>> {
    if bytes.is_empty() || looks_like_json(bytes) {
        return None;
    }
    // ciphertext occasionally parses as protobuf; a real manifest names its URL format
    Some(match Database::decode_bytes(bytes) {
        Ok(db) if db.url_format.is_empty() => Err("decoded message has no urlFormat".to_string()),
        Ok(db) => Ok(db.into_document()),
        Err(e) => Err(e.to_string()),
    })
}

fn decode_encrypted(
    bytes: &[u8],
    decryptor: Option<&Decryptor>,
) -> Option<std::result::Result<ManifestDocument, String>> {
    let plain = match decryptor?.process(bytes) {
        Ok(plain) => plain,
        Err(e) => return Some(Err(e.to_string())),
    };
    let body = plain.get(DIGEST_HEADER_LEN..).unwrap_or_default();
    Some(
        Database::decode_bytes(body)
            .map(Database::into_document)
            .map_err(|e| e.to_string()),
    )
}
