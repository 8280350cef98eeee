//! Integrity verification
//!
//! A payload is accepted only if the status is 200, its length equals the
//! declared size and its MD5 digest equals the declared checksum. Checks
//! run in that order and stop at the first failure.

use crate::error::IntegrityError;
use crate::transport::FetchedBody;
use octo_manifest::{Checksum, ObjectRecord};

/// Check a response against the record's declared size and checksum
///
/// # Errors
/// Returns the first failing check as an `IntegrityError`
pub fn verify(record: &ObjectRecord, response: &FetchedBody) -> Result<(), IntegrityError> {
    if !response.is_success() {
        return Err(IntegrityError::Status {
            status: response.status,
        });
    }

    let actual = response.body.len() as u64;
    if actual != record.size() {
        return Err(IntegrityError::SizeMismatch {
            expected: record.size(),
            actual,
        });
    }

    let digest = Checksum::compute(&response.body);
    if digest != *record.checksum() {
        return Err(IntegrityError::ChecksumMismatch {
            expected: *record.checksum(),
            actual: digest,
        });
    }

    Ok(())
}
