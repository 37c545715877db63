//! Cinder Parser
//!
//! Everything in the pipeline that reads C text.
//!
//! ## Modules
//!
//! - `preprocessor` - system C preprocessor integration and macro tokens
//! - `synthesizer` - header synthesis for units that supply only source
//! - `declaration` - interface declaration parsing into a type table
//! - `treesitter` - tree-sitter helpers shared by the above

pub mod declaration;
pub mod preprocessor;
pub mod synthesizer;
pub mod treesitter;

pub use declaration::{DeclarationError, InterfaceDeclaration, Rendered, TagDecl, TagKind};
pub use preprocessor::{MacroDefinition, MacroError, PreprocessError, SystemPreprocessor};
pub use synthesizer::{CommandSynthesizer, DeclarationSynthesizer, SynthesisError, TreeSitterSynthesizer};

use cinder_core::config::SynthesizerConfig;

/// Get the synthesizer selected by the configuration
pub fn get_synthesizer(config: &SynthesizerConfig) -> Box<dyn DeclarationSynthesizer> {
    match config {
        SynthesizerConfig::TreeSitter => Box::new(TreeSitterSynthesizer::new()),
        SynthesizerConfig::Command { program, args } => {
            Box::new(CommandSynthesizer::new(program.clone(), args.clone()))
        }
    }
}
