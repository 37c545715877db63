//! Cinder Build
//!
//! Turns a parsed interface declaration into a loadable shared library.
//!
//! ## Modules
//!
//! - `shim` - C binding shim exporting symbol and layout tables
//! - `compiler` - shared library builds with the system compiler
//! - `loader` - dynamic loading and table lookup

pub mod compiler;
pub mod loader;
pub mod shim;

pub use compiler::{BuildError, BuildRequest, BuiltLibrary, NativeBuilder};
pub use loader::{LoadError, LoadedLibrary, TypeLayout};
pub use shim::{generate_shim, BUILTIN_TYPES, LAYOUT_TABLE, SYMBOL_TABLE};
