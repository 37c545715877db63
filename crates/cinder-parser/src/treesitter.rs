//! Tree-sitter helpers for C
//!
//! Shared by the declaration synthesizer and the interface declaration
//! parser. Everything here works on a single parsed translation unit.

use tree_sitter::{LanguageError, Node, Parser as TSParser, Point, Tree};

/// Create a parser loaded with the C grammar
pub fn new_parser() -> Result<TSParser, LanguageError> {
    let mut parser = TSParser::new();
    parser.set_language(&tree_sitter_c::language())?;
    Ok(parser)
}

/// Parse `source` as a C translation unit
pub fn parse(source: &str) -> Result<Tree, String> {
    let mut parser = new_parser().map_err(|e| e.to_string())?;
    parser
        .parse(source, None)
        .ok_or_else(|| "Failed to parse source".to_string())
}

pub fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Collapse runs of whitespace to a single space
pub fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Slice `source[start..end]` with collapsed whitespace
pub fn span_text(source: &str, start: usize, end: usize) -> String {
    source.get(start..end).map(collapse).unwrap_or_default()
}

/// Position of the first error or missing node, if the tree has one
pub fn first_error(node: Node) -> Option<Point> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position());
    }
    if !node.has_error() {
        return None;
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// Whether the declaration carries the given storage class (`static`, `extern`)
pub fn has_storage_class(node: Node, source: &str, class: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| child.kind() == "storage_class_specifier" && node_text(child, source) == class);
    found
}

/// Declarator children of a declaration or type definition
pub fn declarators<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let found: Vec<Node<'t>> = node.children_by_field_name("declarator", &mut cursor).collect();
    found
}

/// Declarator with any initializer stripped
pub fn strip_initializer(node: Node) -> Node {
    if node.kind() == "init_declarator" {
        if let Some(inner) = node.child_by_field_name("declarator") {
            return inner;
        }
    }
    node
}

/// The identifier a declarator ultimately names
pub fn declarator_name(node: Node) -> Option<Node> {
    match node.kind() {
        "identifier" | "type_identifier" | "field_identifier" => Some(node),
        _ => {
            if let Some(inner) = node.child_by_field_name("declarator") {
                return declarator_name(inner);
            }
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            children.into_iter().find_map(declarator_name)
        }
    }
}

/// Walk a declarator chain from the outside in
fn chain(node: Node) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut current = Some(node);

    while let Some(n) = current {
        nodes.push(n);
        current = match n.kind() {
            "identifier" | "type_identifier" | "field_identifier" => None,
            "parenthesized_declarator" | "attributed_declarator" => {
                let mut cursor = n.walk();
                let inner = n
                    .named_children(&mut cursor)
                    .find(|c| c.kind().ends_with("declarator") || c.kind().ends_with("identifier"));
                inner
            }
            _ => n.child_by_field_name("declarator"),
        };
    }

    nodes
}

/// True when the declarator declares a function (not a pointer to one)
pub fn declares_function(node: Node) -> bool {
    chain(node).into_iter().any(|n| {
        n.kind() == "function_declarator"
            && n
                .child_by_field_name("declarator")
                .map(|inner| matches!(inner.kind(), "identifier" | "type_identifier"))
                .unwrap_or(false)
    })
}

/// True when the declarator chain contains a pointer
pub fn has_pointer(node: Node) -> bool {
    chain(node)
        .into_iter()
        .any(|n| n.kind() == "pointer_declarator" || n.kind() == "abstract_pointer_declarator")
}

/// True when the declarator chain contains an array without a size
pub fn has_unsized_array(node: Node) -> bool {
    chain(node)
        .into_iter()
        .any(|n| n.kind() == "array_declarator" && n.child_by_field_name("size").is_none())
}

/// True when a function declarator's parameter list ends in `...`
pub fn is_variadic(node: Node) -> bool {
    chain(node).into_iter().any(|n| {
        n.kind() == "function_declarator"
            && n.child_by_field_name("parameters")
                .map(|params| {
                    let mut cursor = params.walk();
                    let variadic = params
                        .children(&mut cursor)
                        .any(|c| c.kind() == "variadic_parameter" || c.kind() == "...");
                    variadic
                })
                .unwrap_or(false)
    })
}
