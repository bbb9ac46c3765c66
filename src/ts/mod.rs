//! Tree-sitter integration for Go source parsing.
//!
//! The Go grammar comes from ast-grep-language so raw tree-sitter parsing and
//! ast-grep lookups always agree on node kinds.

pub mod errors;
pub mod parser;

pub use errors::TreeSitterError;
pub use parser::{ErrorNode, GoParser, ParsedSource};
