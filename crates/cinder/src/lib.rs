//! Cinder
//!
//! Builds fragments of C source into a shared library and loads it into the
//! running process.
//!
//! ```ignore
//! use cinder::{Config, Factory};
//!
//! let factory = Factory::new(Config::default());
//! let module = factory
//!     .create_unit("add2")
//!     .add_source_text("int add2(int a, int b) { return a + b; }")
//!     .finalize()?;
//!
//! let add2 = unsafe { module.function::<extern "C" fn(i32, i32) -> i32>("add2")? };
//! assert_eq!(add2(2, 3), 5);
//! ```
//!
//! ## Modules
//!
//! - `unit` - build units and their fluent builder
//! - `pipeline` - generation, build and load of a unit
//! - `proxy` - loaded modules: symbols, allocation, metadata
//! - `cache` - per-profile module cache
//! - `factory` - pipeline and cache owner
//! - `synthesizer` - declaration synthesis through a native library

pub mod cache;
pub mod factory;
pub mod pipeline;
pub mod proxy;
pub mod synthesizer;
pub mod unit;

pub use cache::ModuleCache;
pub use factory::Factory;
pub use pipeline::Pipeline;
pub use proxy::{BufferSource, ModuleProxy, NativeBox, NativeBuffer};
pub use synthesizer::NativeSynthesizer;
pub use unit::{BuildUnit, UnitBuilder};

pub use cinder_core::{BuildProfile, Config, Error, Fingerprint, Result};
pub use cinder_parser::{CommandSynthesizer, DeclarationSynthesizer, SynthesisError, TreeSitterSynthesizer};
