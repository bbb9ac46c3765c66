//! The rewrite applied to matched call sites.
//!
//! `e.error(err)` becomes
//! `e.WriteString(fmt.Sprintf("\"%s\"", (err).Error()))`: the member is
//! renamed and the first argument is wrapped in place. Both are expressed as
//! edits against the original text, so comments and layout around the call
//! are untouched.

use crate::edit::Edit;
use crate::patch::pattern::CallSite;
use crate::patch::scope::first_named_child;
use serde::Deserialize;
use tree_sitter::Node;

/// How a matched call is rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteRule {
    /// New member name
    pub replacement_method: String,
    /// Function formatting the wrapped argument
    pub format_func: String,
    /// Go string literal passed as the format
    pub quote_format: String,
    /// Method on the argument that describes it
    pub describe_method: String,
    /// Import path the wrapper needs, added when missing
    pub required_import: Option<String>,
}

impl Default for RewriteRule {
    fn default() -> Self {
        Self {
            replacement_method: "WriteString".to_string(),
            format_func: "fmt.Sprintf".to_string(),
            quote_format: r#""\"%s\"""#.to_string(),
            describe_method: "Error".to_string(),
            required_import: Some("fmt".to_string()),
        }
    }
}

impl RewriteRule {
    /// Text inserted in front of the first argument.
    pub fn wrapper_prefix(&self) -> String {
        format!("{}({}, (", self.format_func, self.quote_format)
    }

    /// Text inserted after the first argument.
    pub fn wrapper_suffix(&self) -> String {
        format!(").{}())", self.describe_method)
    }

    /// The full wrapped form of an argument expression.
    pub fn wrap_argument(&self, arg: &str) -> String {
        format!("{}{}{}", self.wrapper_prefix(), arg, self.wrapper_suffix())
    }

    /// Edits turning one matched call into its replacement.
    pub fn edits_for(&self, source: &str, site: &CallSite) -> Vec<Edit> {
        vec![
            Edit::replace(
                source,
                site.member.start,
                site.member.end,
                self.replacement_method.clone(),
            ),
            Edit::insert(site.first_arg.start, self.wrapper_prefix()),
            Edit::insert(site.first_arg.end, self.wrapper_suffix()),
        ]
    }
}

/// An edit adding `import "<path>"` when the file does not import it yet.
///
/// The new spec goes into the first parenthesised import block, in front of
/// the first single-line import, or after the package clause, in that order
/// of preference. gofmt sorts the block afterwards.
pub fn ensure_import(root: Node<'_>, source: &str, path: &str) -> Option<Edit> {
    let quoted = format!("\"{path}\"");

    let mut cursor = root.walk();
    let top_level: Vec<Node<'_>> = root.named_children(&mut cursor).collect();
    let imports: Vec<Node<'_>> = top_level
        .iter()
        .copied()
        .filter(|n| n.kind() == "import_declaration")
        .collect();

    // Only an import bound to the package's own name satisfies the `fmt.`
    // qualifier; `import f "fmt"`, dot and blank imports do not.
    let package_name = path.rsplit('/').next().unwrap_or(path);
    let already_imported = imports.iter().any(|decl| {
        import_specs(*decl).iter().any(|spec| {
            let same_path = spec
                .child_by_field_name("path")
                .is_some_and(|p| unquote(&source[p.byte_range()]) == path);
            let bound_to_package = spec
                .child_by_field_name("name")
                .is_none_or(|n| &source[n.byte_range()] == package_name);
            same_path && bound_to_package
        })
    });
    if already_imported {
        return None;
    }

    for decl in &imports {
        if let Some(list) = first_named_child(*decl).filter(|n| n.kind() == "import_spec_list") {
            let mut cursor = list.walk();
            let open = list.children(&mut cursor).find(|c| c.kind() == "(");
            if let Some(open) = open {
                return Some(Edit::insert(open.end_byte(), format!("\n\t{quoted}")));
            }
        }
    }

    if let Some(first) = imports.first() {
        return Some(Edit::insert(first.start_byte(), format!("import {quoted}\n")));
    }

    top_level
        .iter()
        .find(|n| n.kind() == "package_clause")
        .map(|pkg| Edit::insert(pkg.end_byte(), format!("\n\nimport {quoted}")))
}

fn import_specs(decl: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = decl.walk();
    let mut specs = Vec::new();
    for child in decl.named_children(&mut cursor) {
        match child.kind() {
            "import_spec" => specs.push(child),
            "import_spec_list" => {
                let mut inner = child.walk();
                specs.extend(
                    child
                        .named_children(&mut inner)
                        .filter(|n| n.kind() == "import_spec"),
                );
            }
            _ => {}
        }
    }
    specs
}

/// Strip the quotes of an interpreted or raw Go string literal.
pub(crate) fn unquote(literal: &str) -> &str {
    let trimmed = literal.trim();
    for quote in ['"', '`'] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::apply_edits;
    use crate::ts::GoParser;

    fn with_import(source: &str) -> String {
        let mut parser = GoParser::new().unwrap();
        let parsed = parser.parse_with_source(source).unwrap();
        match ensure_import(parsed.root_node(), source, "fmt") {
            Some(edit) => apply_edits(source, &[edit]).unwrap(),
            None => source.to_string(),
        }
    }

    #[test]
    fn wrapped_argument_shape() {
        let rule = RewriteRule::default();
        assert_eq!(
            rule.wrap_argument("err"),
            r#"fmt.Sprintf("\"%s\"", (err).Error())"#
        );
    }

    #[test]
    fn existing_import_left_alone() {
        let source = "package json\n\nimport (\n\t\"bytes\"\n\t\"fmt\"\n)\n";
        assert_eq!(with_import(source), source);
    }

    #[test]
    fn named_fmt_import_counts() {
        let source = "package json\n\nimport fmt \"fmt\"\n";
        assert_eq!(with_import(source), source);
    }

    #[test]
    fn aliased_import_does_not_count() {
        for alias in ["f", ".", "_"] {
            let source = format!("package json\n\nimport (\n\t{alias} \"fmt\"\n)\n");
            assert_eq!(
                with_import(&source),
                format!("package json\n\nimport (\n\t\"fmt\"\n\t{alias} \"fmt\"\n)\n"),
                "alias {alias}"
            );
        }
    }

    #[test]
    fn added_to_import_block() {
        let source = "package json\n\nimport (\n\t\"bytes\"\n)\n";
        assert_eq!(
            with_import(source),
            "package json\n\nimport (\n\t\"fmt\"\n\t\"bytes\"\n)\n"
        );
    }

    #[test]
    fn added_before_single_import() {
        let source = "package json\n\nimport \"bytes\"\n";
        assert_eq!(
            with_import(source),
            "package json\n\nimport \"fmt\"\nimport \"bytes\"\n"
        );
    }

    #[test]
    fn added_after_package_clause() {
        let source = "package json\n\nfunc f() {}\n";
        assert_eq!(
            with_import(source),
            "package json\n\nimport \"fmt\"\n\nfunc f() {}\n"
        );
    }

    #[test]
    fn unquote_literals() {
        assert_eq!(unquote("\"internal/testenv\""), "internal/testenv");
        assert_eq!(unquote("`fmt`"), "fmt");
        assert_eq!(unquote("bare"), "bare");
    }
}
