use crate::sg::lang::go;
use ast_grep_core::tree_sitter::StrDoc;
use ast_grep_core::AstGrep;
use ast_grep_language::SupportLang;

/// A field child located in Go source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub byte_start: usize,
    pub byte_end: usize,
    pub text: String,
}

/// Field lookup over a parsed Go file.
pub struct FieldFinder {
    sg: AstGrep<StrDoc<SupportLang>>,
}

impl FieldFinder {
    pub fn new(source: &str) -> Self {
        Self {
            sg: AstGrep::new(source, go()),
        }
    }

    /// Find the `field` child of every node of `kind`, in source order.
    pub fn find_field_of_kind(&self, kind: &str, field: &str) -> Vec<FieldMatch> {
        self.sg
            .root()
            .dfs()
            .filter(|node| node.kind() == kind)
            .filter_map(|node| {
                let field_node = node.field(field)?;
                let range = field_node.range();
                Some(FieldMatch {
                    byte_start: range.start,
                    byte_end: range.end,
                    text: field_node.text().to_string(),
                })
            })
            .collect()
    }
}
