//! Bounded-concurrency fetch executor
//!
//! [`FetchExecutor::dispatch`] runs one unit per [`FetchJob`], at most
//! `workers` at a time. Each unit goes through:
//! 1. destination resolution and the idempotence check (no request if the
//!    raw or converted destination exists)
//! 2. download, raced against cancellation and bounded by the timeout,
//!    retried for transient failures only
//! 3. integrity verification
//! 4. the transform chain (on the blocking pool)
//! 5. an atomic write: temporary file in the destination directory, stamped
//!    with the record's server generation as its modification time, then rename
//!
//! Units are isolated: a failure ends only its own unit and is reported in
//! the [`BatchReport`] and on the progress channel. `dispatch` returns once
//! every unit is terminal.

use crate::config::{FetchConfig, FetchOptions};
use crate::error::{FetchError, TransformError};
use crate::path::resolve_destination;
use crate::progress::{ProgressEvent, ProgressSender, Reporter};
use crate::transform::{Codec, Deobfuscator, TransformChain, Transformed};
use crate::transport::{FetchRequest, Transport};
use crate::verify::verify;
use futures::stream::{self, StreamExt};
use octo_manifest::{ManifestStore, ObjectRecord, RecordKind, UrlTemplate};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// One record to fetch
#[derive(Debug, Clone, Copy)]
pub struct FetchJob<'a> {
    pub kind: RecordKind,
    pub record: &'a ObjectRecord,
    pub options: &'a FetchOptions,
}

impl<'a> FetchJob<'a> {
    #[must_use]
    pub fn new(kind: RecordKind, record: &'a ObjectRecord, options: &'a FetchOptions) -> Self {
        Self {
            kind,
            record,
            options,
        }
    }

    /// Log label, e.g. `AB[00042] 'img_general_icon'`
    #[must_use]
    pub fn label(&self) -> String {
        self.record.label(self.kind)
    }
}

/// Read-only state shared by every unit of a batch
#[derive(Debug, Clone)]
pub struct FetchContext<'a> {
    pub template: &'a UrlTemplate,
    /// Default for records without an upload version
    pub manifest_version: i32,
    pub headers: Vec<(String, String)>,
}

impl<'a> FetchContext<'a> {
    #[must_use]
    pub fn new(template: &'a UrlTemplate, manifest_version: i32) -> Self {
        Self {
            template,
            manifest_version,
            headers: Vec::new(),
        }
    }

    /// Context for records of `store`
    #[must_use]
    pub fn for_store(store: &'a ManifestStore) -> Self {
        Self::new(store.url_template(), store.revision().this())
    }

    /// With a header sent on every request
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn request_for(&self, job: &FetchJob<'_>) -> FetchRequest {
        FetchRequest {
            url: self
                .template
                .resolve(job.record, job.kind, self.manifest_version),
            headers: self.headers.clone(),
        }
    }
}

/// Terminal state of one unit
#[derive(Debug)]
pub enum UnitStatus {
    /// Payload written to `path`
    Written { path: PathBuf, converted: bool },
    /// Destination existed; nothing fetched
    Skipped { path: PathBuf },
    /// Unit aborted; nothing written
    Failed(FetchError),
    /// Cancelled before completing; nothing written
    Cancelled,
}

/// Outcome of one unit
#[derive(Debug)]
pub struct UnitOutcome {
    pub kind: RecordKind,
    pub id: i32,
    pub label: String,
    pub status: UnitStatus,
    /// Transform steps that fell back to raw bytes
    pub warnings: Vec<TransformError>,
    /// Network attempts made
    pub attempts: u32,
}

impl UnitOutcome {
    fn pending(job: &FetchJob<'_>) -> Self {
        Self {
            kind: job.kind,
            id: job.record.id(),
            label: job.label(),
            status: UnitStatus::Cancelled,
            warnings: Vec::new(),
            attempts: 0,
        }
    }
}

/// Outcomes of a whole batch, in completion order
#[derive(Debug, Default)]
pub struct BatchReport {
    outcomes: Vec<UnitOutcome>,
}

impl BatchReport {
    #[inline]
    #[must_use]
    pub fn outcomes(&self) -> &[UnitOutcome] {
        &self.outcomes
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    #[must_use]
    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Written { .. }))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Skipped { .. }))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Failed(_)))
    }

    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Cancelled))
    }

    /// Failed units with their errors
    pub fn failures(&self) -> impl Iterator<Item = (&UnitOutcome, &FetchError)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            UnitStatus::Failed(e) => Some((o, e)),
            _ => None,
        })
    }

    /// Whether every unit was written or skipped
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.cancelled() == 0
    }

    /// Escalate any failed or cancelled unit into a batch error
    ///
    /// # Errors
    /// Returns `FetchError::BatchFailed` unless [`BatchReport::is_success`]
    pub fn into_result(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::BatchFailed {
                failed: self.failed() + self.cancelled(),
                total: self.len(),
            })
        }
    }

    fn count(&self, pred: impl Fn(&UnitStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Concurrent fetch-verify-transform-persist pipeline
#[derive(Clone)]
pub struct FetchExecutor {
    transport: Arc<dyn Transport>,
    config: FetchConfig,
    chain: TransformChain,
}

impl std::fmt::Debug for FetchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchExecutor")
            .field("config", &self.config)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl FetchExecutor {
    /// Executor over `transport` with no transform collaborators
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: FetchConfig) -> Self {
        let chain = TransformChain::new(config.bundle_signature.as_bytes().to_vec());
        Self {
            transport,
            config,
            chain,
        }
    }

    /// With deobfuscator for bundles lacking the signature
    #[must_use]
    pub fn with_deobfuscator(mut self, deobfuscator: Arc<dyn Deobfuscator>) -> Self {
        self.chain = self.chain.with_deobfuscator(deobfuscator);
        self
    }

    /// With media codec
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.chain = self.chain.with_codec(codec);
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Run every job to a terminal outcome
    ///
    /// Cancelling `cancel` ends units that have not started and interrupts
    /// in-flight requests; both finish as [`UnitStatus::Cancelled`].
    pub async fn dispatch(
        &self,
        jobs: Vec<FetchJob<'_>>,
        ctx: &FetchContext<'_>,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let reporter = Reporter::new(progress);
        let workers = self.config.workers.max(1);
        tracing::info!("Dispatching {} fetch units on {} workers", jobs.len(), workers);

        let outcomes = stream::iter(jobs)
            .map(|job| self.run_unit(job, ctx, reporter, cancel))
            .buffer_unordered(workers)
            .collect::<Vec<_>>()
            .await;

        let report = BatchReport { outcomes };
        tracing::info!(
            "Batch finished: {} written, {} skipped, {} failed, {} cancelled",
            report.written(),
            report.skipped(),
            report.failed(),
            report.cancelled()
        );
        report
    }

    async fn run_unit(
        &self,
        job: FetchJob<'_>,
        ctx: &FetchContext<'_>,
        reporter: Reporter<'_>,
        cancel: &CancellationToken,
    ) -> UnitOutcome {
        let mut unit = UnitOutcome::pending(&job);
        let result = self.process(&job, ctx, reporter, cancel, &mut unit).await;
        let label = unit.label.clone();
        unit.status = match result {
            Ok(status) => status,
            Err(FetchError::Cancelled) => {
                tracing::info!("{} cancelled", label);
                reporter.emit(ProgressEvent::Cancelled { label });
                UnitStatus::Cancelled
            }
            Err(e) => {
                tracing::error!("{} failed: {}", label, e);
                reporter.emit(ProgressEvent::Failed {
                    label,
                    error: e.to_string(),
                });
                UnitStatus::Failed(e)
            }
        };
        unit
    }

    async fn process(
        &self,
        job: &FetchJob<'_>,
        ctx: &FetchContext<'_>,
        reporter: Reporter<'_>,
        cancel: &CancellationToken,
        unit: &mut UnitOutcome,
    ) -> Result<UnitStatus, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let destination = resolve_destination(job.record, job.kind, job.options, &self.config);
        let converted = self
            .chain
            .planned_extension(job.kind, job.record.name(), &job.options.convert)
            .map(|ext| destination.with_extension(ext));
        for candidate in std::iter::once(&destination).chain(converted.as_ref()) {
            if tokio::fs::try_exists(candidate).await.unwrap_or(false) {
                tracing::warn!("{} already exists at {}", unit.label, candidate.display());
                reporter.emit(ProgressEvent::Skipped {
                    label: unit.label.clone(),
                    path: candidate.clone(),
                });
                return Ok(UnitStatus::Skipped {
                    path: candidate.clone(),
                });
            }
        }

        reporter.emit(ProgressEvent::Started {
            label: unit.label.clone(),
        });
        let request = ctx.request_for(job);
        let body = self
            .download(job.record, &request, cancel, &mut unit.attempts)
            .await?;
        reporter.emit(ProgressEvent::Downloaded {
            label: unit.label.clone(),
            bytes: body.len(),
        });

        let chain = self.chain.clone();
        let (kind, name, convert) = (job.kind, job.record.name().to_string(), job.options.convert.clone());
        let Transformed {
            bytes,
            extension,
            warnings,
        } = tokio::task::spawn_blocking(move || chain.apply(kind, &name, body, &convert))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))?;
        for warning in &warnings {
            tracing::warn!("{}: {}", unit.label, warning);
            reporter.emit(ProgressEvent::Warning {
                label: unit.label.clone(),
                message: warning.to_string(),
            });
        }
        unit.warnings = warnings;

        let path = match &extension {
            Some(ext) => destination.with_extension(ext),
            None => destination,
        };
        persist(path.clone(), bytes, modified_time(job.record.generation())).await?;

        tracing::info!("{} written to {}", unit.label, path.display());
        reporter.emit(ProgressEvent::Completed {
            label: unit.label.clone(),
            path: path.clone(),
        });
        Ok(UnitStatus::Written {
            path,
            converted: extension.is_some(),
        })
    }

    async fn download(
        &self,
        record: &ObjectRecord,
        request: &FetchRequest,
        cancel: &CancellationToken,
        attempts: &mut u32,
    ) -> Result<Vec<u8>, FetchError> {
        let max_attempts = self.config.max_attempts.max(1);
        loop {
            *attempts += 1;
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.attempt(record, request) => result,
            };

            match result {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && *attempts < max_attempts => {
                    let delay = self.config.backoff(*attempts);
                    tracing::warn!(
                        "GET {} attempt {}/{} failed: {}; retrying in {:?}",
                        request.url,
                        attempts,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(FetchError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self, record: &ObjectRecord, request: &FetchRequest) -> Result<Vec<u8>, FetchError> {
        let call = self.transport.get(request);
        let response = match self.config.timeout() {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_| FetchError::Timeout { after })??,
            None => call.await?,
        };
        verify(record, &response)?;
        Ok(response.body)
    }
}

/// Server generations count microseconds since the epoch; zero means unknown
fn modified_time(generation: u64) -> Option<SystemTime> {
    (generation > 0).then(|| SystemTime::UNIX_EPOCH + Duration::from_micros(generation))
}

async fn persist(path: PathBuf, bytes: Vec<u8>, mtime: Option<SystemTime>) -> Result<(), FetchError> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes, mtime))
        .await
        .map_err(|e| FetchError::Task(e.to_string()))?
}

/// Write via a sibling temporary file so readers never see a partial file
fn write_atomic(path: &Path, bytes: &[u8], mtime: Option<SystemTime>) -> Result<(), FetchError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| FetchError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| FetchError::io(path, e))?;
    if let Some(mtime) = mtime {
        tmp.as_file()
            .set_modified(mtime)
            .map_err(|e| FetchError::io(path, e))?;
    }
    tmp.persist(path).map_err(|e| FetchError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IntegrityError;

    fn outcome(status: UnitStatus) -> UnitOutcome {
        UnitOutcome {
            kind: RecordKind::Resource,
            id: 1,
            label: "RS[00001] 'a'".to_string(),
            status,
            warnings: Vec::new(),
            attempts: 1,
        }
    }

    #[test]
    fn report_counts_and_escalates() {
        let report = BatchReport {
            outcomes: vec![
                outcome(UnitStatus::Written {
                    path: PathBuf::from("a"),
                    converted: false,
                }),
                outcome(UnitStatus::Skipped {
                    path: PathBuf::from("b"),
                }),
                outcome(UnitStatus::Failed(IntegrityError::Status { status: 404 }.into())),
            ],
        };
        assert_eq!(report.written(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures().count(), 1);
        assert!(!report.is_success());
        assert!(matches!(
            report.into_result(),
            Err(FetchError::BatchFailed { failed: 1, total: 3 })
        ));
    }

    #[test]
    fn empty_report_is_success() {
        assert!(BatchReport::default().into_result().is_ok());
    }

    #[test]
    fn write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.bin");
        write_atomic(&path, b"data", None).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn write_atomic_stamps_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stamped.bin");
        let mtime = modified_time(1_600_000_000_123_456);
        write_atomic(&path, b"data", mtime).unwrap();
        let actual = std::fs::metadata(&path).unwrap().modified().unwrap();
        let secs = actual.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(secs, 1_600_000_000);
    }

    #[test]
    fn unknown_generation_leaves_time_alone() {
        assert_eq!(modified_time(0), None);
        assert_eq!(
            modified_time(2_000_000),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(2))
        );
    }
}
