//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::Result;

/// Environment variable overriding the C compiler
pub const ENV_COMPILER: &str = "CINDER_CC";
/// Environment variable overriding the generation root
pub const ENV_GEN_ROOT: &str = "CINDER_GEN_ROOT";

/// Cinder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Toolchain configuration
    pub toolchain: ToolchainConfig,

    /// Generation configuration
    pub generation: GenerationConfig,

    /// Echo generated artifacts for every unit
    pub verbose: bool,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply `CINDER_CC` and `CINDER_GEN_ROOT` if they are set
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(cc) = std::env::var_os(ENV_COMPILER).filter(|v| !v.is_empty()) {
            self.toolchain.compiler = Some(PathBuf::from(cc));
        }
        if let Some(root) = std::env::var_os(ENV_GEN_ROOT).filter(|v| !v.is_empty()) {
            self.generation.gen_root = PathBuf::from(root);
        }
        self
    }
}

/// Toolchain configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// C compiler used for preprocessing and building (auto-detected if unset)
    pub compiler: Option<PathBuf>,

    /// Arguments appended to every shared library build
    pub extra_build_args: Vec<String>,
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Root under which each unit gets its own working directory
    pub gen_root: PathBuf,

    /// Declaration synthesizer used when a unit has no header text
    pub synthesizer: SynthesizerConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            gen_root: std::env::temp_dir().join("cinder"),
            synthesizer: SynthesizerConfig::default(),
        }
    }
}

/// Declaration synthesizer selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SynthesizerConfig {
    /// Built-in tree-sitter synthesizer
    #[default]
    TreeSitter,

    /// External program reading source on stdin, writing declarations to stdout
    Command {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gen_root_is_under_temp() {
        let config = Config::default();
        assert!(config.generation.gen_root.starts_with(std::env::temp_dir()));
        assert_eq!(config.generation.synthesizer, SynthesizerConfig::TreeSitter);
        assert!(config.toolchain.compiler.is_none());
    }

    #[test]
    fn test_load_partial_json() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("cinder.json");
        std::fs::write(
            &path,
            r#"{
                "toolchain": { "compiler": "/usr/bin/gcc" },
                "generation": { "synthesizer": { "kind": "command", "program": "makeheaders", "args": ["-h"] } }
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.toolchain.compiler, Some(PathBuf::from("/usr/bin/gcc")));
        assert!(config.toolchain.extra_build_args.is_empty());
        assert_eq!(
            config.generation.synthesizer,
            SynthesizerConfig::Command {
                program: PathBuf::from("makeheaders"),
                args: vec!["-h".to_string()],
            }
        );
        assert!(!config.verbose);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("cinder.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Config::load(&path), Err(crate::Error::Serialization(_))));
    }
}
