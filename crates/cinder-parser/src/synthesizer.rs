//! Declaration synthesis
//!
//! Infers a header for a translation unit that only contains definitions.
//! The pipeline calls a synthesizer when a unit supplies source text but no
//! header text.

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;
use tree_sitter::Node;

use crate::treesitter::{
    collapse, declarators, declares_function, declarator_name, first_error, has_storage_class,
    node_text, parse, span_text, strip_initializer,
};

/// Errors raised while synthesizing declarations
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("C grammar unavailable: {0}")]
    Grammar(String),

    #[error("Syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    #[error("Synthesizer command failed: {0}")]
    Command(String),

    #[error("Native synthesizer failed: {0}")]
    Native(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces forward declarations for the externally visible definitions of
/// a translation unit.
pub trait DeclarationSynthesizer: Send + Sync {
    /// Synthesizer name, for logs
    fn name(&self) -> &str;

    /// Declarations for `source`, one per line
    fn synthesize(&self, source: &str) -> Result<String, SynthesisError>;
}

/// Built-in synthesizer backed by tree-sitter.
///
/// Emits, in source order:
/// - a prototype for every non-`static` function definition
/// - every non-`static` top-level function prototype
/// - an `extern` declaration for every non-`static` global variable
/// - every top-level struct, union, enum and typedef definition
///
/// Functions are emitted once, at their first appearance.
#[derive(Debug, Default, Clone)]
pub struct TreeSitterSynthesizer;

impl TreeSitterSynthesizer {
    pub fn new() -> Self {
        Self
    }

    fn visit_item(&self, node: Node, source: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        match node.kind() {
            "function_definition" => {
                if has_storage_class(node, source, "static") {
                    return;
                }
                let Some(body) = node.child_by_field_name("body") else {
                    return;
                };
                let Some(name) = node
                    .child_by_field_name("declarator")
                    .and_then(declarator_name)
                    .map(|n| node_text(n, source).to_string())
                else {
                    return;
                };
                if seen.insert(name.clone()) {
                    debug!("Found definition: {}", name);
                    out.push(format!("{};", span_text(source, node.start_byte(), body.start_byte())));
                }
            }
            "declaration" => {
                if has_storage_class(node, source, "static") {
                    return;
                }
                self.visit_declaration(node, source, seen, out);
            }
            "type_definition" => {
                out.push(collapse(node_text(node, source)));
            }
            "struct_specifier" | "union_specifier" | "enum_specifier" => {
                if node.child_by_field_name("body").is_some() {
                    out.push(format!("{};", collapse(node_text(node, source))));
                }
            }
            _ => {}
        }
    }

    fn visit_declaration(
        &self,
        node: Node,
        source: &str,
        seen: &mut HashSet<String>,
        out: &mut Vec<String>,
    ) {
        let decls = declarators(node);
        let Some(first) = decls.first() else {
            return;
        };
        let is_extern = has_storage_class(node, source, "extern");
        let prefix = span_text(source, node.start_byte(), first.start_byte());

        for declarator in decls {
            let declarator = strip_initializer(declarator);
            let Some(name) = declarator_name(declarator).map(|n| node_text(n, source).to_string()) else {
                continue;
            };
            let text = collapse(node_text(declarator, source));

            if declares_function(declarator) {
                if seen.insert(name) {
                    out.push(format!("{} {};", prefix, text));
                }
            } else if is_extern {
                out.push(format!("{} {};", prefix, text));
            } else {
                out.push(format!("extern {} {};", prefix, text));
            }
        }
    }
}

impl DeclarationSynthesizer for TreeSitterSynthesizer {
    fn name(&self) -> &str {
        "tree-sitter"
    }

    fn synthesize(&self, source: &str) -> Result<String, SynthesisError> {
        let tree = parse(source).map_err(SynthesisError::Grammar)?;
        let root = tree.root_node();

        if let Some(point) = first_error(root) {
            return Err(SynthesisError::Syntax {
                line: point.row + 1,
                column: point.column,
            });
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut cursor = root.walk();
        for item in root.named_children(&mut cursor) {
            self.visit_item(item, source, &mut seen, &mut out);
        }

        Ok(out.join("\n"))
    }
}

/// Synthesizer delegating to an external program.
///
/// The source is written to the program's stdin; its stdout, trimmed, is
/// the header. A non-zero exit status fails synthesis.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl DeclarationSynthesizer for CommandSynthesizer {
    fn name(&self) -> &str {
        "command"
    }

    fn synthesize(&self, source: &str) -> Result<String, SynthesisError> {
        debug!("Synthesizing with {:?} {:?}", self.program, self.args);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // A program may exit without reading its input; its status decides.
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(source.as_bytes()) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(SynthesisError::Command(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
