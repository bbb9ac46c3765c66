//! Go language support via ast-grep-language.

pub use ast_grep_language::SupportLang;

/// Get the Go language for ast-grep operations.
pub fn go() -> SupportLang {
    SupportLang::Go
}
