//! Octo Fetch
//!
//! Concurrent retrieval of the objects a manifest lists, with integrity
//! verification and atomic writes.
//!
//! # Core Concepts
//!
//! - [`FetchExecutor`]: bounded worker pool running one unit per [`FetchJob`]
//! - [`Transport`]: network seam; [`HttpTransport`] in production
//! - [`verify`]: status, size and MD5 checks before anything touches disk
//! - [`TransformChain`]: optional deobfuscation and media conversion
//! - [`ManifestClient`]: encrypted online manifest retrieval
//! - [`BatchPlan`]: YAML batch instructions routing name patterns to subdirectories
//!
//! # Example
//!
//! ```rust,ignore
//! use octo_fetch::{FetchConfig, FetchContext, FetchExecutor, FetchJob, FetchOptions, HttpTransport};
//!
//! let executor = FetchExecutor::new(Arc::new(HttpTransport::new()), FetchConfig::default());
//! let options = FetchOptions::new("objects");
//! let jobs = store
//!     .iter()
//!     .map(|(kind, record)| FetchJob::new(kind, record, &options))
//!     .collect();
//! let report = executor
//!     .dispatch(jobs, &FetchContext::for_store(&store), None, &CancellationToken::new())
//!     .await
//!     .into_result()?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod client;
mod config;
mod error;
mod executor;
mod path;
mod plan;
mod progress;
mod transform;
mod transport;
mod verify;

// Re-exports
pub use client::ManifestClient;
pub use config::{ConvertOptions, FetchConfig, FetchOptions, ImageResize, ManifestSource, DEFAULT_BUNDLE_SIGNATURE};
pub use error::{ConfigError, FetchError, IntegrityError, Result, TransformError, TransportError};
pub use executor::{BatchReport, FetchContext, FetchExecutor, FetchJob, UnitOutcome, UnitStatus};
pub use path::{categorize, resolve_destination, DEFAULT_IDENTIFIERS};
pub use plan::{BatchPlan, Instruction, OptionOverrides, PostProcess, ResolvedPlan};
pub use progress::{channel, ProgressEvent, ProgressReceiver, ProgressSender};
pub use transform::{select_handler, Codec, Deobfuscator, HandlerKind, TransformChain, Transformed};
pub use transport::{FetchRequest, FetchedBody, HttpTransport, Transport};
pub use verify::verify;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
