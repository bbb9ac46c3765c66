//! ast-grep integration for Go trees.
//!
//! Used where a node is addressed by kind and field alone, like the path
//! literal of an import spec. Call matching needs receiver-type resolution
//! and lives in [`crate::patch`].

pub mod lang;
pub mod matcher;

pub use lang::{go, SupportLang};
pub use matcher::{FieldFinder, FieldMatch};
