//! Import path substitution.
//!
//! `bench_test.go` imports `internal/testenv`, which cannot be imported from
//! outside the Go tree; the fork vendors it and points the import at the
//! copy. This is a plain literal swap located through ast-grep, unrelated to
//! call matching.

use crate::edit::Edit;
use crate::patch::rewrite::unquote;
use crate::sg::FieldFinder;
use serde::Deserialize;

/// Replace `import "<from>"` with `import "<to>"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportRewrite {
    pub from: String,
    pub to: String,
}

impl ImportRewrite {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Edits for every import spec whose path equals one of the `from` paths.
///
/// The alias of an aliased import is preserved.
pub fn plan_import_rewrites(source: &str, rewrites: &[ImportRewrite]) -> Vec<Edit> {
    FieldFinder::new(source)
        .find_field_of_kind("import_spec", "path")
        .into_iter()
        .filter_map(|path| {
            let current = unquote(&path.text);
            rewrites
                .iter()
                .find(|r| r.from == current)
                .map(|r| Edit::replace(source, path.byte_start, path.byte_end, format!("\"{}\"", r.to)))
        })
        .collect()
}
