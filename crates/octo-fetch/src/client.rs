//! Online manifest retrieval
//!
//! The manifest endpoint returns the revision newer than a given base as an
//! AES-CBC encrypted wire message led by a digest header.

use crate::config::ManifestSource;
use crate::error::{FetchError, IntegrityError};
use crate::transport::{FetchRequest, Transport};
use octo_manifest::{DecryptError, Decryptor, Loaded, ManifestError, ManifestStore};
use std::sync::Arc;

/// Client for a [`ManifestSource`]
pub struct ManifestClient {
    transport: Arc<dyn Transport>,
    source: ManifestSource,
    decryptor: Decryptor,
}

impl std::fmt::Debug for ManifestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestClient")
            .field("api_url", &self.source.api_url)
            .field("decryptor", &self.decryptor)
            .finish_non_exhaustive()
    }
}

impl ManifestClient {
    /// Create a client, validating the source's key material
    ///
    /// # Errors
    /// Returns `FetchError::Manifest` if the key or IV is malformed
    pub fn new(transport: Arc<dyn Transport>, source: ManifestSource) -> Result<Self, FetchError> {
        let decryptor = source.decryptor().map_err(ManifestError::from)?;
        Ok(Self {
            transport,
            source,
            decryptor,
        })
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &ManifestSource {
        &self.source
    }

    /// Fetch the manifest revision that follows `base`
    ///
    /// The loaded manifest's base is set to `base` regardless of what the
    /// message carries.
    ///
    /// # Errors
    /// - `FetchError::Transport` if the request fails
    /// - `FetchError::Integrity` on a non-success status
    /// - `FetchError::Manifest` if the body cannot be decrypted or decoded
    pub async fn fetch(&self, base: i32) -> Result<Loaded<ManifestStore>, FetchError> {
        let request = self.source.headers.iter().fold(
            FetchRequest::get(self.source.url_for(base)),
            |request, (name, value)| request.with_header(name, value),
        );
        tracing::info!("Requesting manifest after revision {} from {}", base, request.url);

        let response = self.transport.get(&request).await?;
        if !response.is_success() {
            return Err(IntegrityError::Status {
                status: response.status,
            }
            .into());
        }

        let plain = self
            .decryptor
            .process(&response.body)
            .map_err(ManifestError::from)?;
        let message = plain
            .get(self.source.header_len..)
            .ok_or(ManifestError::Decrypt(DecryptError::TooShort { len: plain.len() }))?;

        let loaded = ManifestStore::from_wire(message, base)?;
        tracing::info!("Fetched manifest {}", loaded.value);
        Ok(loaded)
    }
}
