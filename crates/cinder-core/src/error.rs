//! Error types for Cinder

use thiserror::Error;

/// Cinder error type
///
/// Each variant names the pipeline stage that failed. Stage adapters keep
/// their own error enums and convert into this one at the crate boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The build unit failed validation before any external tool ran.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The C preprocessor exited with a non-zero status.
    #[error("Preprocess error: {diagnostic}")]
    Preprocess { diagnostic: String },

    /// The interface declaration was rejected by the binding layer.
    #[error("Invalid interface declaration: {reason}")]
    InterfaceDeclaration { reason: String, cdef: String },

    /// Compilation or linking of the shared library failed.
    #[error("Build error: {0}")]
    Build(String),

    /// The built library could not be loaded.
    #[error("Load error: {0}")]
    Load(String),

    /// Malformed input to a module helper.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Toolchain not found: {0}")]
    ToolchainNotFound(String),

    /// No finished build of the unit is available to load.
    #[error("Unit '{unit}' is not built: {reason}")]
    NotBuilt { unit: String, reason: String },
}

impl Error {
    /// Offending interface declaration text, if this is a declaration error
    pub fn cdef(&self) -> Option<&str> {
        match self {
            Error::InterfaceDeclaration { cdef, .. } => Some(cdef),
            _ => None,
        }
    }
}

/// Result type alias for Cinder
pub type Result<T> = std::result::Result<T, Error>;
