//! Factory
//!
//! Owns a [`Pipeline`] and the [`ModuleCache`] used for long-lived support
//! libraries such as the native declaration synthesizer.

use cinder_core::{BuildProfile, Config, Result};
use cinder_parser::DeclarationSynthesizer;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cache::ModuleCache;
use crate::pipeline::Pipeline;
use crate::proxy::ModuleProxy;
use crate::synthesizer::NativeSynthesizer;
use crate::unit::UnitBuilder;

/// Declaration of the native synthesizer's entry point
const MAKE_HEADER_DECLARATION: &str = "int make_header(char const *source, char *header);";

/// Warnings silenced when building the native synthesizer
const SYNTHESIZER_SUPPRESSED_WARNINGS: [&str; 4] =
    ["format-overflow", "sign-compare", "unused-function", "stringop-truncation"];

/// Entry point for building units
pub struct Factory {
    pipeline: Pipeline,
    cache: ModuleCache<ModuleProxy>,
    debug: bool,
}

impl Factory {
    pub fn new(config: Config) -> Self {
        Self {
            pipeline: Pipeline::new(config),
            cache: ModuleCache::new(),
            debug: false,
        }
    }

    /// Factory whose units log their artifacts at `info`
    pub fn verbose(mut config: Config) -> Self {
        config.verbose = true;
        Self::new(config)
    }

    /// Factory whose [`Factory::synthesizer`] is the debug build
    pub fn debug(config: Config) -> Self {
        Self {
            debug: true,
            ..Self::new(config)
        }
    }

    pub fn verbose_debug(mut config: Config) -> Self {
        config.verbose = true;
        Self::debug(config)
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_verbose(&self) -> bool {
        self.pipeline.config().verbose
    }

    /// Configuration from defaults plus `CINDER_CC` / `CINDER_GEN_ROOT`
    pub fn from_env() -> Self {
        Self::new(Config::default().with_env_overrides())
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn cache(&self) -> &ModuleCache<ModuleProxy> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ModuleCache<ModuleProxy> {
        &mut self.cache
    }

    /// Synthesizer used by units created from now on
    pub fn set_synthesizer(&mut self, synthesizer: Box<dyn DeclarationSynthesizer>) {
        self.pipeline.set_synthesizer(synthesizer);
    }

    /// Start configuring a unit
    pub fn create_unit(&self, name: &str) -> UnitBuilder<'_> {
        self.pipeline.unit(name)
    }

    /// Native synthesizer in this factory's profile (debug or release)
    pub fn synthesizer(
        &mut self,
        output_folder: impl Into<PathBuf>,
        source_file: impl AsRef<Path>,
    ) -> Result<NativeSynthesizer> {
        self.native_synthesizer(self.debug, output_folder, source_file)
    }

    /// Build (or reuse) a native synthesizer from `source_file`, which must
    /// define `int make_header(char const *source, char *header)`.
    ///
    /// The library is built as unit `cinder_debug` or `cinder_release` under
    /// `output_folder`; debug builds define `DEBUG`.
    pub fn native_synthesizer(
        &mut self,
        debug: bool,
        output_folder: impl Into<PathBuf>,
        source_file: impl AsRef<Path>,
    ) -> Result<NativeSynthesizer> {
        let profile = BuildProfile {
            debug,
            output_folder: output_folder.into(),
        };
        let source_file = source_file.as_ref();
        let file_name = source_file.file_name().map(PathBuf::from).unwrap_or_default();

        let unit = SYNTHESIZER_SUPPRESSED_WARNINGS
            .iter()
            .fold(
                self.pipeline
                    .unit(&format!("cinder_{}", profile.label()))
                    .set_gen_root(&profile.output_folder)
                    .set_source_folder_from(source_file)
                    .add_header_text(MAKE_HEADER_DECLARATION)
                    .add_source_file(file_name)
                    .add_macro_if(debug, "DEBUG")
                    .save_compiler_temps(),
                |builder, warning| builder.suppress_warning(warning),
            )
            .build();

        let fingerprint = unit.fingerprint()?;
        let pipeline = &self.pipeline;
        let module = self.cache.get_or_build(&profile, &fingerprint, || {
            info!("Building native synthesizer for {}", profile);
            pipeline.finalize(&unit)
        })?;

        NativeSynthesizer::new(module)
    }
}
