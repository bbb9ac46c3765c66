//! Parse validation for rewritten Go sources.
//!
//! After edits are spliced in, the result is re-parsed with tree-sitter.
//! Output that gained ERROR nodes the input did not have is never written.

use crate::pool;
use crate::ts::{ParsedSource, TreeSitterError};
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("parse error introduced: found {count} new ERROR nodes")]
    ParseErrorIntroduced {
        count: usize,
        errors: Vec<ErrorLocation>,
    },

    #[error("tree-sitter error: {0}")]
    TreeSitter(#[from] TreeSitterError),
}

/// Location of an error node in the source.
#[derive(Debug, Clone)]
pub struct ErrorLocation {
    pub byte_start: usize,
    pub byte_end: usize,
    pub line: usize,
    pub column: usize,
    pub context: String,
}

/// Validate that `source` parses without errors.
pub fn validate(source: &str) -> Result<(), ValidationError> {
    pool::with_parser(|parser| {
        let parsed = parser.parse_with_source(source)?;
        let errors = collect_errors(&parsed);

        if !errors.is_empty() {
            return Err(ValidationError::ParseErrorIntroduced {
                count: errors.len(),
                errors,
            });
        }

        Ok(())
    })?
}

/// Check that `edited` does not introduce parse errors absent from `original`.
///
/// Error positions are compared by line; edits shift byte offsets but never
/// add lines in front of an unrelated error.
pub fn validate_edit(original: &str, edited: &str) -> Result<(), ValidationError> {
    pool::with_parser(|parser| {
        let original_parsed = parser.parse_with_source(original)?;
        let known: HashSet<usize> = collect_errors(&original_parsed)
            .into_iter()
            .map(|e| e.line)
            .collect();

        let edited_parsed = parser.parse_with_source(edited)?;
        let new_errors: Vec<_> = collect_errors(&edited_parsed)
            .into_iter()
            .filter(|e| !known.contains(&e.line))
            .collect();

        if !new_errors.is_empty() {
            return Err(ValidationError::ParseErrorIntroduced {
                count: new_errors.len(),
                errors: new_errors,
            });
        }

        Ok(())
    })?
}

fn collect_errors(parsed: &ParsedSource<'_>) -> Vec<ErrorLocation> {
    parsed
        .error_nodes()
        .into_iter()
        .map(|node| {
            let line_start = parsed.source[..node.byte_start]
                .rfind('\n')
                .map_or(0, |i| i + 1);
            let line_end = parsed.source[node.byte_start..]
                .find('\n')
                .map_or(parsed.source.len(), |i| node.byte_start + i);

            ErrorLocation {
                byte_start: node.byte_start,
                byte_end: node.byte_end,
                line: node.start_point.row + 1,
                column: node.start_point.column + 1,
                context: parsed.source[line_start..line_end].to_string(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_source_passes() {
        assert!(validate("package json\n\nfunc f() {}\n").is_ok());
    }

    #[test]
    fn invalid_source_reports_context() {
        let err = validate("package json\n\nfunc f( {}\n").unwrap_err();
        match err {
            ValidationError::ParseErrorIntroduced { errors, .. } => {
                assert!(errors.iter().any(|e| e.context.contains("func f(")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn edit_introducing_error_rejected() {
        let original = "package json\n\nfunc f() {\n\te.error(err)\n}\n";
        let edited = "package json\n\nfunc f() {\n\te.WriteString(err\n}\n";
        assert!(matches!(
            validate_edit(original, edited),
            Err(ValidationError::ParseErrorIntroduced { .. })
        ));
    }

    #[test]
    fn edit_keeping_source_valid_accepted() {
        let original = "package json\n\nfunc f() {\n\te.error(err)\n}\n";
        let edited = "package json\n\nfunc f() {\n\te.WriteString(err.Error())\n}\n";
        assert!(validate_edit(original, edited).is_ok());
    }
}
