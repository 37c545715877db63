//! System C Preprocessor Integration
//!
//! Runs the system C compiler in preprocess-only mode (`-w -E`) over a file
//! and returns the expanded text with line markers and leftover directives
//! removed.
//!
//! Invocations block until the compiler exits. There is no timeout, so a
//! hung compiler hangs the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

use super::macros::MacroDefinition;

static INCLUDE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*#\s*include\b").expect("include pattern is valid"));

/// Errors that can occur during preprocessing
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("No C compiler found (tried {0})")]
    CompilerNotFound(String),

    #[error("Preprocessing failed: {diagnostic}")]
    Failed { diagnostic: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid source file: {0}")]
    InvalidSource(String),
}

impl From<PreprocessError> for cinder_core::Error {
    fn from(err: PreprocessError) -> Self {
        match err {
            PreprocessError::CompilerNotFound(tried) => cinder_core::Error::ToolchainNotFound(tried),
            PreprocessError::Failed { diagnostic } => cinder_core::Error::Preprocess { diagnostic },
            PreprocessError::IoError(e) => cinder_core::Error::Io(e),
            PreprocessError::InvalidSource(msg) => cinder_core::Error::Configuration(msg),
        }
    }
}

/// Compiler names probed when none is configured
const COMPILER_CANDIDATES: [&str; 3] = ["cc", "gcc", "clang"];

/// Locate a working C compiler.
///
/// A `preferred` path is used as-is when it answers `--version`; otherwise
/// the usual names are probed on `PATH`.
pub fn find_compiler(preferred: Option<&Path>) -> Result<PathBuf, PreprocessError> {
    let candidates: Vec<PathBuf> = match preferred {
        Some(path) => vec![path.to_path_buf()],
        None => COMPILER_CANDIDATES.iter().map(PathBuf::from).collect(),
    };

    for candidate in &candidates {
        if answers_version(candidate) {
            debug!("Found C compiler at: {:?}", candidate);
            return Ok(candidate.clone());
        }
    }

    let tried = candidates
        .iter()
        .map(|c| c.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(PreprocessError::CompilerNotFound(tried))
}

fn answers_version(compiler: &Path) -> bool {
    Command::new(compiler)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// System preprocessor wrapper
#[derive(Debug, Clone)]
pub struct SystemPreprocessor {
    /// Path to the C compiler driver
    compiler: PathBuf,
}

impl SystemPreprocessor {
    /// Create a preprocessor with a specific compiler path
    pub fn with_path(compiler: PathBuf) -> Self {
        Self { compiler }
    }

    pub fn compiler(&self) -> &Path {
        &self.compiler
    }

    /// Preprocess a file, returning the cleaned expansion
    pub fn preprocess_file(
        &self,
        source_path: &Path,
        macros: &[MacroDefinition],
    ) -> Result<String, PreprocessError> {
        if !source_path.exists() {
            return Err(PreprocessError::InvalidSource(format!(
                "File not found: {:?}",
                source_path
            )));
        }

        let args = self.build_args(macros);
        debug!("Preprocessing {:?} with args: {:?}", source_path, args);

        let output = Command::new(&self.compiler)
            .args(&args)
            .arg(source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            let mut diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
            diagnostic.push_str(&String::from_utf8_lossy(&output.stdout));
            return Err(PreprocessError::Failed {
                diagnostic: diagnostic.trim().to_string(),
            });
        }

        Ok(strip_directives(&String::from_utf8_lossy(&output.stdout)))
    }

    /// `-w -E` followed by one `-D` per macro, in order
    fn build_args(&self, macros: &[MacroDefinition]) -> Vec<String> {
        let mut args = vec!["-w".to_string(), "-E".to_string()];
        args.extend(macros.iter().map(MacroDefinition::to_arg));
        args
    }
}

/// Drop lines starting with `#` (line markers, pragmas), trim the rest
pub fn strip_directives(expanded: &str) -> String {
    expanded
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Remove `#include` lines so synthesis only sees the unit's own code
pub fn strip_includes(source: &str) -> String {
    source
        .lines()
        .filter(|line| !INCLUDE_LINE.is_match(line))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
