//! Declared-type symbol table for Go sources.
//!
//! Only declared types are tracked: a receiver or parameter carries the type
//! written in its declaration, everything introduced by `:=`, `var`, `const`
//! or `range` is a plain local. No inference is attempted.

use std::collections::HashMap;
use std::fmt;
use tree_sitter::Node;

/// Where a name was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Method receiver, `func (e *T) m()`
    Receiver,
    /// Function, method or func-literal parameter
    Parameter,
    /// Named result, `func f() (e *T)`
    Result,
    /// Local declaration inside a function body
    Local,
    /// Package-level var, const or func
    Package,
}

impl BindingKind {
    /// Receivers, parameters and named results are all declared in a field
    /// list and therefore carry an explicit type.
    pub fn is_field(self) -> bool {
        matches!(
            self,
            BindingKind::Receiver | BindingKind::Parameter | BindingKind::Result
        )
    }
}

/// The declared type of a binding, reduced to what call matching needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    /// `*Name`
    Pointer(String),
    /// `Name`
    Named(String),
    /// Any other type expression (qualified, generic, slice, func, ...)
    Other(String),
    /// No type written at the declaration site
    Unknown,
}

impl DeclaredType {
    /// Classify a tree-sitter type node.
    pub fn from_node(node: Node<'_>, source: &str) -> Self {
        let node = unwrap_parens(node);
        match node.kind() {
            "pointer_type" => match first_named_child(node).map(unwrap_parens) {
                Some(inner) if inner.kind() == "type_identifier" => {
                    DeclaredType::Pointer(source[inner.byte_range()].to_string())
                }
                _ => DeclaredType::Other(source[node.byte_range()].to_string()),
            },
            "type_identifier" => DeclaredType::Named(source[node.byte_range()].to_string()),
            _ => DeclaredType::Other(source[node.byte_range()].to_string()),
        }
    }

    /// Whether this is a pointer to the named type.
    pub fn is_pointer_to(&self, name: &str) -> bool {
        matches!(self, DeclaredType::Pointer(n) if n == name)
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Pointer(name) => write!(f, "*{name}"),
            DeclaredType::Named(name) | DeclaredType::Other(name) => f.write_str(name),
            DeclaredType::Unknown => f.write_str("<undeclared>"),
        }
    }
}

/// A resolved declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub kind: BindingKind,
    pub declared_type: DeclaredType,
}

impl Binding {
    pub fn local() -> Self {
        Self {
            kind: BindingKind::Local,
            declared_type: DeclaredType::Unknown,
        }
    }
}

/// Lexical scopes, innermost last.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Binding>>,
}

impl ScopeStack {
    /// A stack holding only the (empty) package scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pop the innermost scope. The package scope is never popped.
    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Whether the innermost scope is the package scope.
    pub fn at_package_level(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Declare `name` in the innermost scope, shadowing outer declarations.
    ///
    /// The blank identifier is never bound.
    pub fn bind(&mut self, name: &str, binding: Binding) {
        if name == "_" {
            return;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), binding);
        }
    }

    /// Find the nearest declaration of `name`.
    pub fn resolve(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

pub(crate) fn unwrap_parens(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_type" {
        match first_named_child(node) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

pub(crate) fn first_named_child(node: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = node.walk();
    let first = node
        .named_children(&mut cursor)
        .find(|child| child.kind() != "comment");
    first
}
