//! One Go parser per thread.
//!
//! Patching a file parses it, re-parses the spliced result for validation
//! and parses the formatted text again, so every call site borrows the same
//! `GoParser` instead of loading the grammar each time.

use crate::ts::{GoParser, TreeSitterError};
use std::cell::RefCell;

thread_local! {
    static GO_PARSER: RefCell<Option<GoParser>> = const { RefCell::new(None) };
}

/// Run `f` with this thread's Go parser, creating it on first use.
///
/// Only grammar loading can fail; errors from `f` itself are returned
/// inside `R`.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use fjson_gen::pool::with_parser;
///
/// let has_errors = with_parser(|parser| {
///     parser
///         .parse_with_source("package json\n\nfunc (e *encodeState) f() {}\n")
///         .map(|parsed| parsed.has_errors())
/// })??;
/// assert!(!has_errors);
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(f: F) -> Result<R, TreeSitterError>
where
    F: FnOnce(&mut GoParser) -> R,
{
    GO_PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(GoParser::new()?);
        }
        Ok(f(slot.as_mut().expect("parser was just initialized above")))
    })
}
