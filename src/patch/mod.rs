//! Structural patch engine for Go sources.
//!
//! One file per invocation, no state carried between files:
//!
//! 1. parse with tree-sitter (a file with syntax errors is refused)
//! 2. [`plan_patch`]: walk the tree once, resolve receivers through the scope
//!    table and turn every match into byte-span [`Edit`]s
//! 3. splice the edits into the original text and re-parse the result
//! 4. pipe through the formatter and write atomically
//!
//! Planning is pure; steps 3 and 4 are shared with the import rewrite.

pub mod imports;
pub mod pattern;
pub mod rewrite;
pub mod scope;

pub use imports::{plan_import_rewrites, ImportRewrite};
pub use pattern::{find_matches, CallPattern, CallSite, MatchSet, SkipReason, SkippedCall};
pub use rewrite::{ensure_import, RewriteRule};
pub use scope::{Binding, BindingKind, DeclaredType, ScopeStack};

use crate::edit::{apply_edits, atomic_write, Edit, EditError};
use crate::format::{FormatError, FormatOutcome, Formatter};
use crate::pool;
use crate::ts::{ParsedSource, TreeSitterError};
use crate::validate::{validate_edit, ValidationError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from rewriting source text in memory.
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("source does not parse: {0}")]
    Parse(#[source] TreeSitterError),

    #[error("planned edits could not be applied: {0}")]
    Edit(#[from] EditError),

    #[error("rewrite produced invalid Go: {0}")]
    InvalidOutput(#[from] ValidationError),
}

/// Errors from patching a file on disk.
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rewrite {path}: {source}")]
    Rewrite {
        path: PathBuf,
        #[source]
        source: RewriteError,
    },

    #[error("failed to format {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: EditError,
    },
}

impl PatchError {
    /// Whether the file was refused because it does not parse.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            PatchError::Rewrite {
                source: RewriteError::Parse(_),
                ..
            }
        )
    }
}

/// Everything planned for one file.
#[derive(Debug, Clone, Default)]
pub struct PatchPlan {
    pub matches: MatchSet,
    pub edits: Vec<Edit>,
}

/// Plan the rewrite of every call matching `pattern`. Pure.
pub fn plan_patch(parsed: &ParsedSource<'_>, pattern: &CallPattern, rule: &RewriteRule) -> PatchPlan {
    let root = parsed.root_node();
    let matches = find_matches(root, parsed.source, pattern);

    let mut edits: Vec<Edit> = matches
        .sites
        .iter()
        .flat_map(|site| rule.edits_for(parsed.source, site))
        .collect();

    if !matches.sites.is_empty() {
        if let Some(import) = rule
            .required_import
            .as_deref()
            .and_then(|path| ensure_import(root, parsed.source, path))
        {
            edits.push(import);
        }
    }

    PatchPlan { matches, edits }
}

/// The in-memory result of a rewrite.
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub text: String,
    pub plan: PatchPlan,
}

/// Parse, plan, splice and validate a call rewrite of `source`.
pub fn rewrite_source(
    source: &str,
    pattern: &CallPattern,
    rule: &RewriteRule,
) -> Result<Rewritten, RewriteError> {
    let plan = with_parsed(source, |parsed| plan_patch(parsed, pattern, rule))?;
    let text = splice_and_validate(source, &plan.edits)?;
    Ok(Rewritten { text, plan })
}

/// Parse, plan, splice and validate an import rewrite of `source`.
///
/// Returns the new text and the number of rewritten imports.
pub fn rewrite_imports_source(
    source: &str,
    rewrites: &[ImportRewrite],
) -> Result<(String, usize), RewriteError> {
    with_parsed(source, |_| ())?;
    let edits = plan_import_rewrites(source, rewrites);
    let text = splice_and_validate(source, &edits)?;
    Ok((text, edits.len()))
}

fn with_parsed<T>(
    source: &str,
    f: impl FnOnce(&ParsedSource<'_>) -> T,
) -> Result<T, RewriteError> {
    pool::with_parser(|parser| {
        let parsed = parser.parse_with_source(source).map_err(RewriteError::Parse)?;
        if let Some(error) = parsed.first_error() {
            return Err(RewriteError::Parse(error));
        }
        Ok(f(&parsed))
    })
    .map_err(RewriteError::Parse)?
}

fn splice_and_validate(source: &str, edits: &[Edit]) -> Result<String, RewriteError> {
    if edits.is_empty() {
        return Ok(source.to_string());
    }
    let text = apply_edits(source, edits)?;
    validate_edit(source, &text)?;
    Ok(text)
}

/// Outcome of patching one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub path: PathBuf,
    /// Call sites (or imports) rewritten
    pub rewritten: usize,
    /// Candidate calls the pattern rejected
    pub skipped: Vec<SkippedCall>,
    /// Whether the formatter ran
    pub formatted: bool,
    /// Whether the file content changed
    pub changed: bool,
}

/// A patched file that has not been written yet.
#[derive(Debug, Clone)]
pub struct PendingPatch {
    pub report: PatchReport,
    pub original: String,
    pub patched: String,
}

impl PendingPatch {
    /// Write the patched text back, if it differs.
    pub fn commit(self) -> Result<PatchReport, PatchError> {
        if self.report.changed {
            atomic_write(&self.report.path, self.patched.as_bytes()).map_err(|source| {
                PatchError::Write {
                    path: self.report.path.clone(),
                    source,
                }
            })?;
        }
        Ok(self.report)
    }
}

/// Compute the call rewrite of the file at `path` without writing it.
pub fn prepare_patch(
    path: &Path,
    pattern: &CallPattern,
    rule: &RewriteRule,
    formatter: &Formatter,
) -> Result<PendingPatch, PatchError> {
    let original = read_source(path)?;
    let rewritten = rewrite_source(&original, pattern, rule).map_err(|source| {
        PatchError::Rewrite {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let matches = &rewritten.plan.matches;
    let sites = &matches.sites;
    let skipped = matches.skipped.clone();
    for site in sites {
        debug!(path = %path.display(), line = site.line, receiver = %site.receiver, "rewriting call");
    }
    if sites.is_empty() {
        // No candidates at all points at a renamed method, type mismatches at
        // a renamed receiver type.
        warn!(
            path = %path.display(),
            method = %pattern.method,
            receiver_type = %pattern.receiver_type,
            candidates = matches.candidates(),
            type_mismatches = matches.type_mismatches(),
            "no matching calls found; upstream code may have drifted"
        );
    }

    let rewritten_count = sites.len();
    let (patched, formatted) = format_source(path, rewritten.text, formatter)?;
    Ok(PendingPatch {
        report: PatchReport {
            path: path.to_path_buf(),
            rewritten: rewritten_count,
            skipped,
            formatted,
            changed: patched != original,
        },
        original,
        patched,
    })
}

/// Rewrite every matching call in the file at `path` and write it back.
pub fn apply_patch(
    path: &Path,
    pattern: &CallPattern,
    rule: &RewriteRule,
    formatter: &Formatter,
) -> Result<PatchReport, PatchError> {
    let report = prepare_patch(path, pattern, rule, formatter)?.commit()?;
    info!(
        path = %path.display(),
        rewritten = report.rewritten,
        skipped = report.skipped.len(),
        "patched calls"
    );
    Ok(report)
}

/// Compute the import rewrite of the file at `path` without writing it.
pub fn prepare_import_rewrite(
    path: &Path,
    rewrites: &[ImportRewrite],
    formatter: &Formatter,
) -> Result<PendingPatch, PatchError> {
    let original = read_source(path)?;
    let (text, count) = rewrite_imports_source(&original, rewrites).map_err(|source| {
        PatchError::Rewrite {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let (patched, formatted) = format_source(path, text, formatter)?;
    Ok(PendingPatch {
        report: PatchReport {
            path: path.to_path_buf(),
            rewritten: count,
            skipped: Vec::new(),
            formatted,
            changed: patched != original,
        },
        original,
        patched,
    })
}

/// Rewrite import paths in the file at `path` and write it back.
pub fn rewrite_imports(
    path: &Path,
    rewrites: &[ImportRewrite],
    formatter: &Formatter,
) -> Result<PatchReport, PatchError> {
    let report = prepare_import_rewrite(path, rewrites, formatter)?.commit()?;
    info!(path = %path.display(), rewritten = report.rewritten, "rewrote imports");
    Ok(report)
}

fn read_source(path: &Path) -> Result<String, PatchError> {
    fs::read_to_string(path).map_err(|source| PatchError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn format_source(
    path: &Path,
    text: String,
    formatter: &Formatter,
) -> Result<(String, bool), PatchError> {
    match formatter.format(&text) {
        Ok(FormatOutcome::Formatted(formatted)) => Ok((formatted, true)),
        Ok(FormatOutcome::Skipped) => Ok((text, false)),
        Err(source) => Err(PatchError::Format {
            path: path.to_path_buf(),
            source,
        }),
    }
}
