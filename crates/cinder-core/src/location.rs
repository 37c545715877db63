//! Positions inside generated artifacts

use serde::{Deserialize, Serialize};

/// A position inside a generated text artifact (cdef, header, shim)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Artifact name, e.g. `cdef` or a file path
    pub artifact: String,
    /// Line (1-based)
    pub line: u32,
    /// Column (0-based)
    pub column: u32,
}

impl Location {
    /// Create a new location
    pub fn new(artifact: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            artifact: artifact.into(),
            line,
            column,
        }
    }

    /// The source line this location points into
    pub fn line_in<'a>(&self, text: &'a str) -> Option<&'a str> {
        let index = (self.line as usize).checked_sub(1)?;
        text.lines().nth(index)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.artifact, self.line, self.column)
    }
}
