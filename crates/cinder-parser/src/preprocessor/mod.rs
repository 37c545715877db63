//! C Preprocessor Integration
//!
//! Runs the system C preprocessor over generated files with the unit's
//! macro set and cleans the expansion for use as an interface declaration.

pub mod macros;
pub mod system;

pub use macros::{MacroDefinition, MacroError};
pub use system::{find_compiler, strip_directives, strip_includes, PreprocessError, SystemPreprocessor};
