//! fjson-gen: regenerates a patched `encoding/json` fork for Go releases.
//!
//! For every release tag the upstream source archive is fetched, the json
//! package (plus `internal/testenv`) is extracted into its own directory, and
//! `encode.go` is rewritten so `e.error(err)` on an `*encodeState` receiver
//! writes the error as a quoted string instead of panicking.
//!
//! # Architecture
//!
//! Rewrites compile down to one primitive: [`Edit`], a verified byte-span
//! replacement. The patch engine parses with tree-sitter, resolves receivers
//! through a scope table, and produces a pure list of edits that is applied
//! once, re-parsed, formatted and written atomically.
//!
//! # Example
//!
//! ```no_run
//! use fjson_gen::patch::{rewrite_source, CallPattern, RewriteRule};
//!
//! let source = "package json\n\nfunc (e *encodeState) f(err error) {\n\te.error(err)\n}\n";
//! let out = rewrite_source(source, &CallPattern::default(), &RewriteRule::default())?;
//! assert_eq!(out.plan.matches.sites.len(), 1);
//! # Ok::<(), fjson_gen::patch::RewriteError>(())
//! ```

pub mod archive;
pub mod catalog;
pub mod config;
pub mod edit;
pub mod format;
pub mod patch;
pub mod pool;
pub mod run;
pub mod safety;
pub mod sg;
pub mod telemetry;
pub mod ts;
pub mod validate;

// Re-exports
pub use archive::{fetch_and_extract, ArchiveError, ExtractSummary, PathFilter};
pub use catalog::{list_releases, CatalogError, ReleaseFilter, ReleaseId};
pub use config::{load_from_path, load_from_str, ConfigError, GenConfig};
pub use edit::{apply_edits, Edit, EditError, EditVerification};
pub use format::{FormatError, FormatOutcome, Formatter};
pub use patch::{apply_patch, rewrite_imports, CallPattern, PatchError, PatchReport, RewriteRule};
pub use run::{GenError, Generator, RunSummary};
pub use safety::{OutputGuard, SafetyError};
pub use ts::{GoParser, TreeSitterError};
pub use validate::{validate, ValidationError};
