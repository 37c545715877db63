//! Interface declaration ("cdef") parsing
//!
//! Turns the preprocessed, directive-free header text handed to the binding
//! layer into a type table: tagged types, typedefs, functions and global
//! variables. Only declarations are accepted; function bodies, initializers
//! and syntax errors are rejected with their position. `static` definitions
//! have no external symbol and are skipped.

use cinder_core::Location;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tree_sitter::Node;

use crate::treesitter::{
    declarators, declares_function, declarator_name, first_error, has_pointer, has_storage_class,
    has_unsized_array, is_variadic, node_text, parse, span_text,
};

/// Artifact name used in locations
const ARTIFACT: &str = "cdef";

/// Errors for declarations the binding layer cannot accept
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("C grammar unavailable: {0}")]
    Grammar(String),

    #[error("syntax error at {0}")]
    Syntax(Location),

    #[error("function body for `{name}` at {location}")]
    FunctionBody { name: String, location: Location },

    #[error("initializer for `{name}` at {location}")]
    Initializer { name: String, location: Location },

    #[error("unexpected `{kind}` at {location}")]
    Unexpected { kind: String, location: Location },
}

impl DeclarationError {
    pub fn location(&self) -> Option<&Location> {
        match self {
            DeclarationError::Grammar(_) => None,
            DeclarationError::Syntax(location)
            | DeclarationError::FunctionBody { location, .. }
            | DeclarationError::Initializer { location, .. }
            | DeclarationError::Unexpected { location, .. } => Some(location),
        }
    }

    /// Convert into the pipeline error, attaching the offending text
    pub fn into_error(self, cdef: &str) -> cinder_core::Error {
        let reason = match self.location().and_then(|l| l.line_in(cdef)) {
            Some(line) => format!("{}: {}", self, line.trim()),
            None => self.to_string(),
        };
        cinder_core::Error::InterfaceDeclaration {
            reason,
            cdef: cdef.to_string(),
        }
    }
}

/// Declaration split around the declared name.
///
/// `int (*handler)(int)` is stored as `int (*` + `)(int)` so the name can be
/// replaced by an alias or dropped to get the bare type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered {
    pub before: String,
    pub after: String,
}

impl Rendered {
    /// Render with `alias` as the declarator name, or as a bare type
    pub fn render(&self, alias: Option<&str>) -> String {
        match alias {
            Some(alias) if self.before.ends_with(['*', '(']) => format!("{}{}{}", self.before, alias, self.after),
            Some(alias) => format!("{} {}{}", self.before, alias, self.after),
            None => format!("{}{}", self.before, self.after),
        }
    }
}

/// Kind of tagged type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TagKind {
    Struct,
    Union,
    Enum,
}

impl TagKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            TagKind::Struct => "struct",
            TagKind::Union => "union",
            TagKind::Enum => "enum",
        }
    }

    fn from_node_kind(kind: &str) -> Option<Self> {
        match kind {
            "struct_specifier" => Some(TagKind::Struct),
            "union_specifier" => Some(TagKind::Union),
            "enum_specifier" => Some(TagKind::Enum),
            _ => None,
        }
    }
}

/// A named struct, union or enum
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagDecl {
    pub kind: TagKind,
    pub name: String,
    /// A body was seen somewhere in the declaration
    pub complete: bool,
}

impl TagDecl {
    /// `struct name`
    pub fn c_name(&self) -> String {
        format!("{} {}", self.kind.keyword(), self.name)
    }
}

/// What a typedef's declared type is built on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
enum BaseType {
    Primitive(String),
    Tag { kind: TagKind, name: Option<String>, has_body: bool },
    Named(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypedefDecl {
    pub name: String,
    pub rendered: Rendered,
    /// `sizeof` can be applied to this type
    pub sized: bool,
    #[serde(skip)]
    base: BaseType,
    #[serde(skip)]
    shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub rendered: Rendered,
    pub variadic: bool,
    /// Internal linkage; never part of the symbol table
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableDecl {
    pub name: String,
    pub rendered: Rendered,
    pub is_static: bool,
}

/// Declarator properties relevant to sizing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Shape {
    function: bool,
    pointer: bool,
    unsized_array: bool,
}

/// Parsed interface declaration
#[derive(Debug, Clone, Default, Serialize)]
pub struct InterfaceDeclaration {
    text: String,
    pub tags: Vec<TagDecl>,
    pub typedefs: Vec<TypedefDecl>,
    pub functions: Vec<FunctionDecl>,
    pub variables: Vec<VariableDecl>,
}

impl InterfaceDeclaration {
    /// Parse cdef text
    pub fn parse(cdef: &str) -> Result<Self, DeclarationError> {
        let tree = parse(cdef).map_err(DeclarationError::Grammar)?;
        let root = tree.root_node();

        if let Some(point) = first_error(root) {
            return Err(DeclarationError::Syntax(Location::new(
                ARTIFACT,
                point.row as u32 + 1,
                point.column as u32,
            )));
        }

        let mut decl = InterfaceDeclaration {
            text: cdef.to_string(),
            ..Default::default()
        };

        let mut cursor = root.walk();
        let items: Vec<Node> = root.named_children(&mut cursor).collect();
        for item in items {
            decl.visit_item(item, cdef)?;
        }

        decl.resolve_sizes();
        Ok(decl)
    }

    /// The cdef text this table was parsed from
    pub fn text(&self) -> &str {
        &self.text
    }

    fn visit_item(&mut self, node: Node, source: &str) -> Result<(), DeclarationError> {
        match node.kind() {
            "comment" => Ok(()),
            "declaration" => {
                self.collect_tags(node, source);
                self.visit_declaration(node, source)
            }
            "type_definition" => {
                self.collect_tags(node, source);
                self.visit_typedef(node, source);
                Ok(())
            }
            "struct_specifier" | "union_specifier" | "enum_specifier" => {
                self.collect_tags(node, source);
                Ok(())
            }
            "function_definition" if has_storage_class(node, source, "static") => Ok(()),
            "function_definition" => {
                let name = node
                    .child_by_field_name("declarator")
                    .and_then(declarator_name)
                    .map(|n| node_text(n, source).to_string())
                    .unwrap_or_default();
                Err(DeclarationError::FunctionBody {
                    name,
                    location: location_of(node),
                })
            }
            kind => Err(DeclarationError::Unexpected {
                kind: kind.to_string(),
                location: location_of(node),
            }),
        }
    }

    fn visit_declaration(&mut self, node: Node, source: &str) -> Result<(), DeclarationError> {
        let is_static = has_storage_class(node, source, "static");
        let specifiers = specifier_text(node, source);

        for declarator in declarators(node) {
            let Some(name_node) = declarator_name(declarator) else {
                continue;
            };
            let name = node_text(name_node, source).to_string();

            if declarator.kind() == "init_declarator" {
                if is_static {
                    continue;
                }
                return Err(DeclarationError::Initializer {
                    name,
                    location: location_of(declarator),
                });
            }

            let rendered = render(&specifiers, declarator, name_node, source);
            if declares_function(declarator) {
                self.functions.push(FunctionDecl {
                    name,
                    rendered,
                    variadic: is_variadic(declarator),
                    is_static,
                });
            } else {
                self.variables.push(VariableDecl {
                    name,
                    rendered,
                    is_static,
                });
            }
        }

        Ok(())
    }

    fn visit_typedef(&mut self, node: Node, source: &str) {
        let specifiers = specifier_text(node, source);
        let base = node
            .child_by_field_name("type")
            .map(|t| base_type(t, source))
            .unwrap_or(BaseType::Unknown);

        for declarator in declarators(node) {
            let Some(name_node) = declarator_name(declarator) else {
                continue;
            };
            self.typedefs.push(TypedefDecl {
                name: node_text(name_node, source).to_string(),
                rendered: render(&specifiers, declarator, name_node, source),
                sized: false,
                base: base.clone(),
                shape: Shape {
                    function: declares_function(declarator),
                    pointer: has_pointer(declarator),
                    unsized_array: has_unsized_array(declarator),
                },
            });
        }
    }

    /// Record every named struct/union/enum in the subtree
    fn collect_tags(&mut self, node: Node, source: &str) {
        if let Some(kind) = TagKind::from_node_kind(node.kind()) {
            if let Some(name) = node.child_by_field_name("name") {
                let name = node_text(name, source).to_string();
                let has_body = node.child_by_field_name("body").is_some();
                match self.tags.iter_mut().find(|t| t.kind == kind && t.name == name) {
                    Some(tag) => tag.complete |= has_body,
                    None => self.tags.push(TagDecl {
                        kind,
                        name,
                        complete: has_body,
                    }),
                }
            }
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.collect_tags(child, source);
        }
    }

    /// Decide which typedefs `sizeof` can be applied to
    fn resolve_sizes(&mut self) {
        let complete: HashMap<(TagKind, String), bool> = self
            .tags
            .iter()
            .map(|t| ((t.kind, t.name.clone()), t.complete))
            .collect();
        let by_name: HashMap<String, (BaseType, Shape)> = self
            .typedefs
            .iter()
            .map(|t| (t.name.clone(), (t.base.clone(), t.shape)))
            .collect();

        for typedef in &mut self.typedefs {
            typedef.sized = is_sized(&typedef.base, typedef.shape, &complete, &by_name, 0);
        }
    }

    fn tag_names(&self, kind: TagKind) -> Vec<String> {
        self.tags
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn struct_names(&self) -> Vec<String> {
        self.tag_names(TagKind::Struct)
    }

    pub fn union_names(&self) -> Vec<String> {
        self.tag_names(TagKind::Union)
    }

    pub fn enum_names(&self) -> Vec<String> {
        self.tag_names(TagKind::Enum)
    }

    pub fn typedef_names(&self) -> Vec<String> {
        self.typedefs.iter().map(|t| t.name.clone()).collect()
    }

    pub fn typedef(&self, name: &str) -> Option<&TypedefDecl> {
        self.typedefs.iter().find(|t| t.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDecl> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// C type names whose size and alignment can be taken, in declaration order
    pub fn sized_types(&self) -> Vec<String> {
        let tags = self.tags.iter().filter(|t| t.complete).map(TagDecl::c_name);
        let typedefs = self.typedefs.iter().filter(|t| t.sized).map(|t| t.name.clone());
        let mut names: Vec<String> = tags.chain(typedefs).collect();
        names.dedup();
        names
    }

    /// Names with external linkage: functions, then variables, first declaration wins
    pub fn symbols(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let functions = self.functions.iter().filter(|f| !f.is_static).map(|f| &f.name);
        let variables = self.variables.iter().filter(|v| !v.is_static).map(|v| &v.name);
        for name in functions.chain(variables) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

fn is_sized(
    base: &BaseType,
    shape: Shape,
    complete: &HashMap<(TagKind, String), bool>,
    by_name: &HashMap<String, (BaseType, Shape)>,
    depth: usize,
) -> bool {
    if shape.function || shape.unsized_array || depth > 32 {
        return false;
    }
    if shape.pointer {
        return true;
    }
    match base {
        BaseType::Primitive(name) => name != "void",
        BaseType::Tag { has_body: true, .. } => true,
        BaseType::Tag { kind, name: Some(name), .. } => {
            complete.get(&(*kind, name.clone())).copied().unwrap_or(false)
        }
        BaseType::Tag { name: None, .. } => false,
        BaseType::Named(name) => match by_name.get(name) {
            Some((base, shape)) => is_sized(base, *shape, complete, by_name, depth + 1),
            None => false,
        },
        BaseType::Unknown => false,
    }
}

fn base_type(node: Node, source: &str) -> BaseType {
    if let Some(kind) = TagKind::from_node_kind(node.kind()) {
        return BaseType::Tag {
            kind,
            name: node
                .child_by_field_name("name")
                .map(|n| node_text(n, source).to_string()),
            has_body: node.child_by_field_name("body").is_some(),
        };
    }
    match node.kind() {
        "primitive_type" | "sized_type_specifier" => BaseType::Primitive(node_text(node, source).to_string()),
        "type_identifier" => BaseType::Named(node_text(node, source).to_string()),
        _ => BaseType::Unknown,
    }
}

/// Type qualifiers and specifiers of a declaration, storage classes dropped
fn specifier_text(node: Node, source: &str) -> String {
    let cutoff = declarators(node)
        .first()
        .map(|d| d.start_byte())
        .unwrap_or_else(|| node.end_byte());

    let mut parts = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.start_byte() >= cutoff {
            break;
        }
        match child.kind() {
            "type_qualifier" | "primitive_type" | "sized_type_specifier" | "type_identifier"
            | "struct_specifier" | "union_specifier" | "enum_specifier" | "macro_type_specifier" => {
                parts.push(span_text(source, child.start_byte(), child.end_byte()));
            }
            _ => {}
        }
    }
    parts.join(" ")
}

fn render(specifiers: &str, declarator: Node, name: Node, source: &str) -> Rendered {
    let inner_before = span_text(source, declarator.start_byte(), name.start_byte());
    let after = span_text(source, name.end_byte(), declarator.end_byte());
    let before = [specifiers, inner_before.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    Rendered { before, after }
}

fn location_of(node: Node) -> Location {
    let point = node.start_position();
    Location::new(ARTIFACT, point.row as u32 + 1, point.column as u32)
}
