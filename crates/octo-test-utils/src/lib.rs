//! Testing utilities for Octo workspace
//!
//! Shared fixtures: record and manifest builders, a scripted transport,
//! an encryption helper and stub transform collaborators.

#![allow(missing_docs)]

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use async_trait::async_trait;
use octo_fetch::{
    Codec, ConvertOptions, Deobfuscator, FetchRequest, FetchedBody, HandlerKind, TransformError,
    Transport, TransportError,
};
use octo_manifest::document::{Generation, ManifestDocument, RecordDocument};
use octo_manifest::{Checksum, ManifestStore, ObjectRecord, RevisionRepr};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const TEST_URL_FORMAT: &str = "https://cdn.test/{type}/{o}?v={v}";

pub fn record_doc(id: i32, name: &str, payload: &[u8]) -> RecordDocument {
    RecordDocument {
        id,
        name: name.to_string(),
        size: payload.len() as i64,
        crc: 0,
        dependencies: Vec::new(),
        state: None,
        md5: Checksum::compute(payload).to_string(),
        object_name: format!("obj{id:04}"),
        generation: Generation(1_700_000_000_000_000),
        upload_version_id: None,
    }
}

pub fn record(id: i32, name: &str, payload: &[u8]) -> ObjectRecord {
    ObjectRecord::from_document(record_doc(id, name, payload)).unwrap()
}

pub fn manifest_doc(
    revision: RevisionRepr,
    bundles: Vec<RecordDocument>,
    resources: Vec<RecordDocument>,
) -> ManifestDocument {
    ManifestDocument {
        revision,
        asset_bundle_list: Some(bundles),
        resource_list: Some(resources),
        url_format: Some(TEST_URL_FORMAT.to_string()),
    }
}

pub fn store(this: i32, bundles: Vec<RecordDocument>, resources: Vec<RecordDocument>) -> ManifestStore {
    ManifestStore::from_document(manifest_doc(RevisionRepr::Bare(this), bundles, resources), 0)
        .unwrap()
        .into_inner()
}

/// AES-CBC encrypt with PKCS7 padding; key length picks the variant
pub fn encrypt(key: &[u8], iv: &[u8], plain: &[u8]) -> Vec<u8> {
    match key.len() {
        16 => cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        24 => cbc::Encryptor::<aes::Aes192>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
        _ => cbc::Encryptor::<aes::Aes256>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plain),
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(FetchedBody),
    Fail(String),
}

/// Transport answering from a per-URL script
///
/// Each URL holds a queue of responses; the last one repeats. Unknown
/// URLs answer 404. Every call is counted and recorded.
#[derive(Debug, Default)]
pub struct StubTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<FetchRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every response for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.script(url, Scripted::Respond(FetchedBody::ok(body)));
    }

    pub fn serve_status(&self, url: impl Into<String>, status: u16) {
        self.script(
            url,
            Scripted::Respond(FetchedBody {
                status,
                body: Vec::new(),
            }),
        );
    }

    pub fn fail(&self, url: impl Into<String>, message: impl Into<String>) {
        self.script(url, Scripted::Fail(message.into()));
    }

    /// Append a response to the URL's queue
    pub fn script(&self, url: impl Into<String>, response: Scripted) {
        self.routes.lock().entry(url.into()).or_default().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    /// Highest number of concurrent calls observed
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next(&self, url: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock();
        let queue = routes.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, request: &FetchRequest) -> Result<FetchedBody, TransportError> {
        self.requests.lock().push(request.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let response = match self.next(&request.url) {
            Some(Scripted::Respond(body)) => Ok(body),
            Some(Scripted::Fail(message)) => Err(TransportError::Other(message)),
            None => Ok(FetchedBody {
                status: 404,
                body: Vec::new(),
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

pub const XOR_KEY: u8 = 0x5a;

pub fn obfuscate(plain: &[u8]) -> Vec<u8> {
    plain.iter().map(|b| b ^ XOR_KEY).collect()
}

/// Deobfuscator undoing [`obfuscate`]
#[derive(Debug, Default)]
pub struct XorDeobfuscator;

impl Deobfuscator for XorDeobfuscator {
    fn deobfuscate(&self, _name: &str, payload: &[u8]) -> Result<Vec<u8>, TransformError> {
        Ok(obfuscate(payload))
    }
}

/// Codec that prefixes `<format>:` to the payload, or always fails
#[derive(Debug, Default)]
pub struct StubCodec {
    pub fail: bool,
}

impl Codec for StubCodec {
    fn convert(
        &self,
        handler: HandlerKind,
        payload: &[u8],
        format: &str,
        _options: &ConvertOptions,
    ) -> Result<Vec<u8>, TransformError> {
        if self.fail {
            return Err(TransformError::Convert {
                handler,
                format: format.to_string(),
                message: "stub codec failure".to_string(),
            });
        }
        let mut out = format!("{format}:").into_bytes();
        out.extend_from_slice(payload);
        Ok(out)
    }
}
