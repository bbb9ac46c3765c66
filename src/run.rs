//! Run orchestration: discover releases, then extract and patch each one.
//!
//! Releases are processed one after another. A failure inside one release is
//! logged and recorded; only discovery failure stops the run.

use crate::archive::{fetch_and_extract, ArchiveError, ArchiveSource, ExtractSummary, HttpArchiveSource};
use crate::catalog::{list_releases, CatalogError, HttpTagSource, ReleaseFilter, ReleaseId, TagSource};
use crate::config::GenConfig;
use crate::format::Formatter;
use crate::patch::{apply_patch, rewrite_imports, PatchError, PatchReport};
use crate::safety::{OutputGuard, SafetyError};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum GenError {
    #[error("release discovery failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("failed to prepare output directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// What happened to one release.
#[derive(Debug)]
pub struct ReleaseReport {
    pub release: ReleaseId,
    pub dir: PathBuf,
    pub extract: ExtractSummary,
    pub patches: Vec<PatchReport>,
}

#[derive(Debug)]
pub struct FailedRelease {
    pub release: ReleaseId,
    pub error: GenError,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<ReleaseReport>,
    pub failed: Vec<FailedRelease>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

pub struct Generator {
    config: GenConfig,
    tags: Box<dyn TagSource>,
    archives: Box<dyn ArchiveSource>,
    formatter: Formatter,
    only: BTreeSet<String>,
}

impl Generator {
    pub fn new(
        config: GenConfig,
        tags: Box<dyn TagSource>,
        archives: Box<dyn ArchiveSource>,
    ) -> Self {
        let formatter = config.format.formatter();
        Self {
            config,
            tags,
            archives,
            formatter,
            only: BTreeSet::new(),
        }
    }

    /// A generator talking to the configured registry and archive host.
    ///
    /// The registry token is read from the environment here, once.
    pub fn from_config(config: GenConfig) -> Self {
        let token = std::env::var(&config.catalog.token_env).ok();
        let tags = HttpTagSource::new(&config.catalog.tags_url, config.catalog.per_page, token);
        let archives = HttpArchiveSource::new(&config.archive.url_template);
        Self::new(config, Box::new(tags), Box::new(archives))
    }

    /// Restrict the run to these releases, by tag (`go1.21`) or number (`1.21`).
    pub fn with_only<I, S>(mut self, releases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = releases.into_iter().map(Into::into).collect();
        self
    }

    pub fn config(&self) -> &GenConfig {
        &self.config
    }

    pub fn release_filter(&self) -> Result<ReleaseFilter, CatalogError> {
        let catalog = &self.config.catalog;
        ReleaseFilter::new(
            &catalog.release_pattern,
            &catalog.denylist,
            catalog.version_req.as_deref(),
        )
    }

    /// Releases this run would process, newest first.
    pub fn discover(&self) -> Result<Vec<ReleaseId>, GenError> {
        let filter = self.release_filter()?;
        let mut releases = list_releases(self.tags.as_ref(), &filter)?;
        if !self.only.is_empty() {
            releases.retain(|r| self.only.contains(r.tag()) || self.only.contains(r.number()));
        }
        Ok(releases)
    }

    /// Process every discovered release. Errors only when discovery fails.
    pub fn run(&self) -> Result<RunSummary, GenError> {
        let releases = self.discover()?;
        let total = releases.len();
        let mut summary = RunSummary::default();

        for (idx, release) in releases.into_iter().enumerate() {
            info!("{}/{} - {}", idx + 1, total, release);
            match self.process_release(&release) {
                Ok(report) => summary.completed.push(report),
                Err(err) => {
                    error!(release = %release, error = %err, "release failed");
                    summary.failed.push(FailedRelease {
                        release,
                        error: err,
                    });
                }
            }
        }

        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            "run finished"
        );
        Ok(summary)
    }

    /// Rebuild `<output>/<number>` for one release.
    ///
    /// Anything already in the directory is removed first. When a patch step
    /// fails, the extracted files stay on disk.
    pub fn process_release(&self, release: &ReleaseId) -> Result<ReleaseReport, GenError> {
        let dir = self.config.output.root.join(release.number());
        reset_dir(&dir)?;

        let extract = fetch_and_extract(
            self.archives.as_ref(),
            release,
            &dir,
            &self.config.archive.filters,
        )?;
        info!(
            release = %release,
            files = extract.files,
            skipped = extract.skipped,
            "extracted"
        );

        let patches = self.patch_dir(&dir)?;
        Ok(ReleaseReport {
            release: release.clone(),
            dir,
            extract,
            patches,
        })
    }

    /// Run the configured call patches and import rewrites on an extracted
    /// release directory.
    pub fn patch_dir(&self, dir: &Path) -> Result<Vec<PatchReport>, GenError> {
        let guard = OutputGuard::new(dir)?;
        let mut reports = Vec::new();

        for patch in &self.config.patches {
            let path = checked_path(&guard, &patch.file)?;
            reports.push(apply_patch(&path, &patch.pattern, &patch.rule, &self.formatter)?);
        }

        for import in &self.config.imports {
            let path = checked_path(&guard, &import.file)?;
            if !path.exists() {
                warn!(path = %path.display(), "import rewrite target missing, skipped");
                continue;
            }
            reports.push(rewrite_imports(&path, &import.rewrites, &self.formatter)?);
        }

        Ok(reports)
    }
}

fn reset_dir(dir: &Path) -> Result<(), GenError> {
    let prepare = |source| GenError::Prepare {
        path: dir.to_path_buf(),
        source,
    };
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(prepare)?;
    }
    fs::create_dir_all(dir).map_err(prepare)
}

fn checked_path(guard: &OutputGuard, file: &str) -> Result<PathBuf, SafetyError> {
    let path = guard.entry_path(file)?;
    if path.exists() {
        guard.validate_path(&path)
    } else {
        Ok(path)
    }
}
