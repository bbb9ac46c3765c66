//! Call pattern evaluation over a Go syntax tree.
//!
//! A single pre-order walk keeps a [`ScopeStack`] in step with the tree, so
//! every `call_expression` is judged against the declarations visible at
//! that point. Names are bound after their initialiser has been visited,
//! which keeps `e := e.next()` resolving the right-hand `e` to the outer
//! declaration.

use crate::patch::scope::{first_named_child, Binding, BindingKind, DeclaredType, ScopeStack};
use serde::Deserialize;
use std::ops::Range;
use tracing::debug;
use tree_sitter::Node;

/// Structural predicate: `recv.<method>(...)` where `recv` is declared as a
/// receiver or parameter of type `*<receiver_type>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallPattern {
    pub method: String,
    pub receiver_type: String,
}

impl CallPattern {
    pub fn new(method: impl Into<String>, receiver_type: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            receiver_type: receiver_type.into(),
        }
    }
}

impl Default for CallPattern {
    fn default() -> Self {
        Self::new("error", "encodeState")
    }
}

/// A call expression that satisfied the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Span of the whole call expression
    pub call: Range<usize>,
    /// Span of the member name (`error` in `e.error(err)`)
    pub member: Range<usize>,
    /// Span of the first argument
    pub first_arg: Range<usize>,
    /// Receiver identifier text
    pub receiver: String,
    /// 1-based line of the call
    pub line: usize,
}

/// Why a syntactic candidate (`x.<method>(...)`) was not a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The receiver is an expression, not a plain identifier
    ReceiverNotIdentifier,
    /// No declaration of the receiver is visible
    Unresolved,
    /// The receiver is declared, but not in a field list
    NotField(BindingKind),
    /// The receiver's declared type differs
    TypeMismatch(DeclaredType),
    /// The call has no argument to wrap
    NoArguments,
}

/// A candidate call that the pattern rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCall {
    pub line: usize,
    pub receiver: String,
    pub reason: SkipReason,
}

/// Result of one traversal.
#[derive(Debug, Clone, Default)]
pub struct MatchSet {
    pub sites: Vec<CallSite>,
    pub skipped: Vec<SkippedCall>,
}

impl MatchSet {
    /// Every `x.<method>(...)` call seen, matched or not.
    pub fn candidates(&self) -> usize {
        self.sites.len() + self.skipped.len()
    }

    /// Candidates whose receiver resolved to a different type.
    pub fn type_mismatches(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::TypeMismatch(_)))
            .count()
    }
}

/// Walk the whole tree rooted at `root` and collect pattern matches.
pub fn find_matches(root: Node<'_>, source: &str, pattern: &CallPattern) -> MatchSet {
    let mut walker = Walker {
        source,
        pattern,
        scopes: ScopeStack::new(),
        found: MatchSet::default(),
    };
    walker.seed_package_scope(root);
    walker.visit(root);
    walker.found
}

struct Walker<'s, 'p> {
    source: &'s str,
    pattern: &'p CallPattern,
    scopes: ScopeStack,
    found: MatchSet,
}

impl<'s, 'p> Walker<'s, 'p> {
    fn text(&self, node: Node<'_>) -> &'s str {
        &self.source[node.byte_range()]
    }

    /// Package-level names are visible regardless of declaration order.
    fn seed_package_scope(&mut self, root: Node<'_>) {
        let package = Binding {
            kind: BindingKind::Package,
            declared_type: DeclaredType::Unknown,
        };
        for decl in named_children(root) {
            let names: Vec<Node<'_>> = match decl.kind() {
                "function_declaration" => decl.child_by_field_name("name").into_iter().collect(),
                "type_declaration" => specs(decl, &["type_spec", "type_alias"])
                    .into_iter()
                    .filter_map(|spec| spec.child_by_field_name("name"))
                    .collect(),
                "var_declaration" | "const_declaration" => specs(decl, &["var_spec", "const_spec"])
                    .into_iter()
                    .flat_map(|spec| field_nodes(spec, "name"))
                    .collect(),
                _ => Vec::new(),
            };
            for name in names {
                self.scopes.bind(self.text(name), package.clone());
            }
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "function_declaration" | "method_declaration" | "func_literal" => {
                self.visit_function(node)
            }
            "block" | "if_statement" | "for_statement" | "expression_switch_statement"
            | "select_statement" | "expression_case" | "type_case" | "default_case"
            | "communication_case" => {
                self.scopes.push();
                self.visit_children(node);
                self.scopes.pop();
            }
            "type_switch_statement" => self.visit_type_switch(node),
            "short_var_declaration" => {
                self.visit_field(node, "right");
                self.bind_locals(node.child_by_field_name("left"));
            }
            "range_clause" | "receive_statement" => {
                self.visit_field(node, "right");
                if has_token(node, ":=") {
                    self.bind_locals(node.child_by_field_name("left"));
                } else {
                    self.visit_field(node, "left");
                }
            }
            "var_spec" | "const_spec" => {
                self.visit_field(node, "value");
                if !self.scopes.at_package_level() {
                    for name in field_nodes(node, "name") {
                        self.scopes.bind(self.text(name), Binding::local());
                    }
                }
            }
            "call_expression" => {
                self.check_call(node);
                self.visit_children(node);
            }
            _ => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: Node<'_>) {
        for child in named_children(node) {
            self.visit(child);
        }
    }

    fn visit_field(&mut self, node: Node<'_>, field: &str) {
        for child in field_nodes(node, field) {
            self.visit(child);
        }
    }

    fn visit_function(&mut self, node: Node<'_>) {
        self.scopes.push();
        if let Some(receiver) = node.child_by_field_name("receiver") {
            self.bind_fields(receiver, BindingKind::Receiver);
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            self.bind_fields(params, BindingKind::Parameter);
        }
        if let Some(result) = node.child_by_field_name("result") {
            if result.kind() == "parameter_list" {
                self.bind_fields(result, BindingKind::Result);
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            // The body block shares the parameter scope in Go; a separate
            // scope for it is harmless since nothing is bound between.
            self.visit(body);
        }
        self.scopes.pop();
    }

    fn visit_type_switch(&mut self, node: Node<'_>) {
        self.scopes.push();
        self.visit_field(node, "initializer");
        self.visit_field(node, "value");
        self.bind_locals(node.child_by_field_name("alias"));
        for child in named_children(node) {
            if matches!(child.kind(), "type_case" | "default_case") {
                self.visit(child);
            }
        }
        self.scopes.pop();
    }

    fn bind_fields(&mut self, list: Node<'_>, kind: BindingKind) {
        for decl in named_children(list) {
            if !matches!(
                decl.kind(),
                "parameter_declaration" | "variadic_parameter_declaration"
            ) {
                continue;
            }
            let declared_type = match decl.child_by_field_name("type") {
                Some(ty) if decl.kind() == "parameter_declaration" => {
                    DeclaredType::from_node(ty, self.source)
                }
                Some(ty) => DeclaredType::Other(format!("...{}", self.text(ty))),
                None => DeclaredType::Unknown,
            };
            for name in field_nodes(decl, "name") {
                self.scopes.bind(
                    self.text(name),
                    Binding {
                        kind,
                        declared_type: declared_type.clone(),
                    },
                );
            }
        }
    }

    fn bind_locals(&mut self, list: Option<Node<'_>>) {
        let Some(list) = list else {
            return;
        };
        let names = if list.kind() == "identifier" {
            vec![list]
        } else {
            named_children(list)
                .into_iter()
                .filter(|n| n.kind() == "identifier")
                .collect()
        };
        for name in names {
            self.scopes.bind(self.text(name), Binding::local());
        }
    }

    fn check_call(&mut self, call: Node<'_>) {
        let Some(function) = call.child_by_field_name("function") else {
            return;
        };
        if function.kind() != "selector_expression" {
            return;
        }
        let Some(member) = function.child_by_field_name("field") else {
            return;
        };
        if self.text(member) != self.pattern.method {
            return;
        }

        let line = call.start_position().row + 1;
        let Some(operand) = function.child_by_field_name("operand") else {
            return;
        };
        let receiver = self.text(operand).to_string();

        match self.evaluate(call, operand) {
            Ok(first_arg) => self.found.sites.push(CallSite {
                call: call.byte_range(),
                member: member.byte_range(),
                first_arg,
                receiver,
                line,
            }),
            Err(reason) => {
                debug!(line, receiver = %receiver, ?reason, "candidate call skipped");
                self.found.skipped.push(SkippedCall {
                    line,
                    receiver,
                    reason,
                });
            }
        }
    }

    fn evaluate(&self, call: Node<'_>, operand: Node<'_>) -> Result<Range<usize>, SkipReason> {
        if operand.kind() != "identifier" {
            return Err(SkipReason::ReceiverNotIdentifier);
        }
        let binding = self
            .scopes
            .resolve(self.text(operand))
            .ok_or(SkipReason::Unresolved)?;
        if !binding.kind.is_field() {
            return Err(SkipReason::NotField(binding.kind));
        }
        if !binding
            .declared_type
            .is_pointer_to(&self.pattern.receiver_type)
        {
            return Err(SkipReason::TypeMismatch(binding.declared_type.clone()));
        }

        call.child_by_field_name("arguments")
            .and_then(first_named_child)
            .map(|arg| arg.byte_range())
            .ok_or(SkipReason::NoArguments)
    }
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children = node.named_children(&mut cursor).collect();
    children
}

fn field_nodes<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let nodes = node.children_by_field_name(field, &mut cursor).collect();
    nodes
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == token);
    found
}

/// Spec children of a declaration, looking through `(...)` spec lists.
fn specs<'t>(decl: Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    for child in named_children(decl) {
        if kinds.contains(&child.kind()) {
            out.push(child);
        } else if child.kind().ends_with("_spec_list") {
            out.extend(
                named_children(child)
                    .into_iter()
                    .filter(|n| kinds.contains(&n.kind())),
            );
        }
    }
    out
}
