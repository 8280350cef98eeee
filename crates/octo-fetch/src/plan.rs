//! Declarative batch plans
//!
//! A plan selects records by name pattern and routes each selection to its
//! own subdirectory with its own options:
//!
//! ```yaml
//! root: downloads/{revision}
//! defaults:
//!   categorize: false
//!   audio: wav
//! instructions:
//!   - criterion: img_general_icon
//!     subdir: icons
//!   - criterion: sud_vo_{char}
//!     subdir: voice/{char}
//!     audio: mp3
//! post-processing:
//!   program: python
//!   args: [wallpaper_kit_pp.py, "{root}"]
//! ```
//!
//! - `{revision}` in `root` becomes the manifest revision (`v12`)
//! - an instruction whose criterion contains `{char}` is repeated once per
//!   character identifier, substituting into both criterion and subdir
//! - instruction options override `defaults`
//! - the post-processing command runs once after every unit is terminal,
//!   from the caller's directory, with `{root}` substituted (or the root
//!   appended if no argument mentions it); scripts are looked up beside
//!   the plan file

use crate::config::{ConvertOptions, FetchOptions, ImageResize};
use crate::error::{ConfigError, FetchError};
use crate::executor::{BatchReport, FetchContext, FetchExecutor, FetchJob};
use crate::path::DEFAULT_IDENTIFIERS;
use crate::progress::ProgressSender;
use octo_manifest::{ManifestStore, ObjectRecord, RecordKind, Revision};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const REVISION_PLACEHOLDER: &str = "{revision}";
const CHAR_PLACEHOLDER: &str = "{char}";
const ROOT_PLACEHOLDER: &str = "{root}";

/// Identifiers substituted for `{char}` when a plan lists none
const DEFAULT_CHARACTER_COUNT: usize = 12;

/// Partial [`FetchOptions`]; unset fields fall through to the next layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OptionOverrides {
    pub categorize: Option<bool>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
    pub image_resize: Option<ImageResize>,
}

impl OptionOverrides {
    /// `self` with unset fields taken from `fallback`
    #[must_use]
    pub fn or(&self, fallback: &Self) -> Self {
        Self {
            categorize: self.categorize.or(fallback.categorize),
            image: self.image.clone().or_else(|| fallback.image.clone()),
            audio: self.audio.clone().or_else(|| fallback.audio.clone()),
            video: self.video.clone().or_else(|| fallback.video.clone()),
            image_resize: self.image_resize.or(fallback.image_resize),
        }
    }

    /// Concrete options writing below `destination`
    #[must_use]
    pub fn to_options(&self, destination: PathBuf) -> FetchOptions {
        let defaults = FetchOptions::default();
        FetchOptions {
            destination,
            categorize: self.categorize.unwrap_or(defaults.categorize),
            convert: ConvertOptions {
                image: self.image.clone(),
                audio: self.audio.clone(),
                video: self.video.clone(),
                image_resize: self.image_resize,
            },
        }
    }
}

/// One selection of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Name pattern, matched case-insensitively from the start of the name
    pub criterion: String,
    /// Directory below the plan root
    #[serde(default)]
    pub subdir: String,
    #[serde(flatten)]
    pub overrides: OptionOverrides,
}

/// Command run after the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcess {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl PostProcess {
    fn args_for(&self, root: &Path) -> Vec<String> {
        let root = root.to_string_lossy();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(ROOT_PLACEHOLDER, &root))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(ROOT_PLACEHOLDER)) {
            args.push(root.into_owned());
        }
        args
    }

    /// Command run from the caller's directory, so `root` means the same
    /// thing to the script as to the fetches
    ///
    /// A program given as a relative path, and any argument naming a file
    /// beside the plan, are resolved against `base_dir`.
    fn command(&self, root: &Path, base_dir: Option<&Path>) -> tokio::process::Command {
        let program = match base_dir {
            Some(dir) if Path::new(&self.program).components().count() > 1 => {
                beside_plan(dir, &self.program).unwrap_or_else(|| dir.join(&self.program))
            }
            _ => PathBuf::from(&self.program),
        };
        let args = self.args_for(root).into_iter().map(|arg| {
            base_dir
                .and_then(|dir| beside_plan(dir, &arg))
                .map_or(arg, |path| path.to_string_lossy().into_owned())
        });
        let mut command = tokio::process::Command::new(program);
        command.args(args);
        command
    }
}

fn beside_plan(base_dir: &Path, value: &str) -> Option<PathBuf> {
    let relative = Path::new(value);
    if value.is_empty() || relative.is_absolute() {
        return None;
    }
    let candidate = base_dir.join(relative);
    candidate.is_file().then_some(candidate)
}

/// Batch instruction document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BatchPlan {
    /// Output root; may contain `{revision}`
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default)]
    pub defaults: OptionOverrides,
    /// Values for `{char}`; defaults to the leading identifiers
    #[serde(default)]
    pub characters: Option<Vec<String>>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub post_processing: Option<PostProcess>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

fn default_root() -> String {
    FetchOptions::default().destination.to_string_lossy().into_owned()
}

impl BatchPlan {
    /// Parse and validate YAML
    ///
    /// # Errors
    /// Returns `ConfigError::Yaml` on malformed YAML, `ConfigError::Invalid`
    /// for an empty criterion or a `{char}` used only in a subdir
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let plan: Self = serde_yaml::from_str(text)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Read a plan file; post-processing scripts are looked up beside it
    ///
    /// # Errors
    /// Returns `ConfigError` if the file is unreadable or invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut plan = Self::from_yaml_str(&text)?;
        plan.base_dir = path.parent().map(Path::to_path_buf);
        Ok(plan)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for instruction in &self.instructions {
            if instruction.criterion.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "criterion",
                    reason: "must not be empty".to_string(),
                });
            }
            if instruction.subdir.contains(CHAR_PLACEHOLDER)
                && !instruction.criterion.contains(CHAR_PLACEHOLDER)
            {
                return Err(ConfigError::Invalid {
                    field: "subdir",
                    reason: format!(
                        "'{}' uses {CHAR_PLACEHOLDER} but criterion '{}' does not",
                        instruction.subdir, instruction.criterion
                    ),
                });
            }
        }
        Ok(())
    }

    /// Output root for a manifest at `revision`
    #[must_use]
    pub fn root_for(&self, revision: Revision) -> PathBuf {
        PathBuf::from(self.root.replace(REVISION_PLACEHOLDER, &revision.to_string()))
    }

    fn characters(&self) -> Vec<&str> {
        match &self.characters {
            Some(chars) => chars.iter().map(String::as_str).collect(),
            None => DEFAULT_IDENTIFIERS
                .iter()
                .take(DEFAULT_CHARACTER_COUNT)
                .copied()
                .collect(),
        }
    }

    /// `(criterion, subdir, overrides)` with `{char}` expanded
    fn expand(&self) -> Vec<(String, String, &OptionOverrides)> {
        let characters = self.characters();
        let mut expanded = Vec::new();
        for instruction in &self.instructions {
            if instruction.criterion.contains(CHAR_PLACEHOLDER) {
                for ch in &characters {
                    expanded.push((
                        instruction.criterion.replace(CHAR_PLACEHOLDER, ch),
                        instruction.subdir.replace(CHAR_PLACEHOLDER, ch),
                        &instruction.overrides,
                    ));
                }
            } else {
                expanded.push((
                    instruction.criterion.clone(),
                    instruction.subdir.clone(),
                    &instruction.overrides,
                ));
            }
        }
        expanded
    }

    /// Match every instruction against `store`
    ///
    /// # Errors
    /// Returns `FetchError::Manifest` for an invalid criterion pattern
    pub fn resolve<'s>(&self, store: &'s ManifestStore) -> Result<ResolvedPlan<'s>, FetchError> {
        let root = self.root_for(store.revision());
        let mut groups = Vec::new();
        for (criterion, subdir, overrides) in self.expand() {
            let records = store.search(&criterion)?;
            if records.is_empty() {
                tracing::warn!("Criterion '{}' matched no records", criterion);
                continue;
            }
            let options = overrides.or(&self.defaults).to_options(root.join(subdir));
            groups.push((options, records));
        }
        Ok(ResolvedPlan { root, groups })
    }

    /// Resolve against `store`, fetch everything, then post-process
    ///
    /// Post-processing is skipped if `cancel` fired.
    ///
    /// # Errors
    /// Returns an error if the plan cannot be resolved or the
    /// post-processing command fails; per-unit failures are in the report
    pub async fn execute(
        &self,
        executor: &FetchExecutor,
        store: &ManifestStore,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, FetchError> {
        let resolved = self.resolve(store)?;
        tracing::info!(
            "Plan resolved to {} units under {}",
            resolved.len(),
            resolved.root().display()
        );
        let ctx = FetchContext::for_store(store);
        let report = executor.dispatch(resolved.jobs(), &ctx, progress, cancel).await;

        match &self.post_processing {
            Some(_) if cancel.is_cancelled() => {
                tracing::warn!("Batch cancelled; skipping post-processing");
            }
            Some(post) => self.post_process(post, resolved.root()).await?,
            None => {}
        }
        Ok(report)
    }

    async fn post_process(&self, post: &PostProcess, root: &Path) -> Result<(), FetchError> {
        let failed = |reason: String| FetchError::PostProcess {
            program: post.program.clone(),
            reason,
        };
        let mut command = post.command(root, self.base_dir.as_deref());

        tracing::info!("Running post-processing '{}' on {}", post.program, root.display());
        let status = command.status().await.map_err(|e| failed(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(failed(status.to_string()))
        }
    }
}

/// Plan matched against one manifest
#[derive(Debug)]
pub struct ResolvedPlan<'s> {
    root: PathBuf,
    groups: Vec<(FetchOptions, Vec<(RecordKind, &'s ObjectRecord)>)>,
}

impl<'s> ResolvedPlan<'s> {
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of jobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, records)| records.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One job per matched record, in instruction order
    #[must_use]
    pub fn jobs(&self) -> Vec<FetchJob<'_>> {
        self.groups
            .iter()
            .flat_map(|(options, records)| {
                records
                    .iter()
                    .map(move |&(kind, record)| FetchJob::new(kind, record, options))
            })
            .collect()
    }
}
