//! Build-and-bind pipeline
//!
//! Drives a [`BuildUnit`] through header synthesis, preprocessing, the
//! binding shim, compilation and loading.
//!
//! Every step shells out to the system C toolchain and blocks until the tool
//! exits. There is no timeout and nothing can be cancelled: a hung compiler
//! hangs the caller. Units are processed one at a time, and two units sharing
//! a working directory race on its files.

use cinder_build::{generate_shim, BuildRequest, LoadedLibrary, NativeBuilder};
use cinder_core::{Config, Error, Fingerprint, Fingerprinter, Result};
use cinder_parser::preprocessor::{find_compiler, strip_includes};
use cinder_parser::{get_synthesizer, DeclarationSynthesizer, InterfaceDeclaration, MacroDefinition, SystemPreprocessor};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::proxy::ModuleProxy;
use crate::unit::{BuildUnit, UnitBuilder};

/// Unit source text, compiled with the caller's sources
pub const GENERATED_SOURCE: &str = "cinder_generated.c";
/// Supplied or synthesized header, included last
pub const GENERATED_HEADER: &str = "cinder_generated.h";
/// Scratch file for preprocessing text
pub const PREPROCESS_INPUT: &str = "cinder_cpp.c";
/// `#include` of every header, preprocessed into the interface declaration
pub const AMALGAMATED_HEADER: &str = "cinder_amalgamated.h";
/// Record of the last successful build, read back by [`Pipeline::load`]
pub const BUILD_RECORD: &str = "cinder_build.json";

#[derive(Debug, Serialize, Deserialize)]
struct BuildRecord {
    /// Fingerprint of the unit that was built
    unit: Fingerprint,
    /// Library file name inside the working directory
    library: String,
    cdef: String,
}

/// Log at `info` for verbose units, `debug` otherwise
macro_rules! echo {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// The build-and-bind pipeline
pub struct Pipeline {
    config: Config,
    synthesizer: Box<dyn DeclarationSynthesizer>,
    compiler: OnceCell<PathBuf>,
}

impl Pipeline {
    /// Create a pipeline using the configured synthesizer
    pub fn new(config: Config) -> Self {
        let synthesizer = get_synthesizer(&config.generation.synthesizer);
        Self {
            config,
            synthesizer,
            compiler: OnceCell::new(),
        }
    }

    /// Replace the declaration synthesizer
    pub fn with_synthesizer(mut self, synthesizer: Box<dyn DeclarationSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn set_synthesizer(&mut self, synthesizer: Box<dyn DeclarationSynthesizer>) {
        self.synthesizer = synthesizer;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn synthesizer(&self) -> &dyn DeclarationSynthesizer {
        self.synthesizer.as_ref()
    }

    /// Start configuring a unit
    pub fn unit(&self, name: &str) -> UnitBuilder<'_> {
        UnitBuilder::new(self, name)
    }

    /// C compiler driver, resolved on first use
    pub fn compiler(&self) -> Result<&Path> {
        let compiler = self
            .compiler
            .get_or_try_init(|| find_compiler(self.config.toolchain.compiler.as_deref()))?;
        Ok(compiler.as_path())
    }

    /// Generate, build and load `unit`.
    ///
    /// Finalizing the same unit again rewrites every generated file and
    /// yields an equivalent module. The library path changes whenever the
    /// built library would differ: unit content, synthesized declarations,
    /// compiler or command line.
    pub fn finalize(&self, unit: &BuildUnit) -> Result<ModuleProxy> {
        let macros = unit.validate()?;
        let compiler = self.compiler()?.to_path_buf();
        let preprocessor = SystemPreprocessor::with_path(compiler.clone());
        let verbose = unit.verbose();

        let work_dir = unit.work_dir();
        fs::create_dir_all(&work_dir)?;
        info!("Finalizing unit '{}' in {:?}", unit.name(), work_dir);

        let generated_header = work_dir.join(GENERATED_HEADER);
        remove_if_exists(&generated_header)?;

        let generated_source = work_dir.join(GENERATED_SOURCE);
        fs::write(&generated_source, format!("{}\n", unit.source_text()))?;
        echo!(verbose, "Saved source text to {:?}:\n{}", generated_source, unit.source_text());

        let header_text = self.resolve_header(unit, &work_dir, &preprocessor, &macros)?;
        fs::write(&generated_header, format!("{}\n", header_text))?;
        echo!(verbose, "Saved header text to {:?}:\n{}", generated_header, header_text);

        let mut headers = unit.header_files().to_vec();
        headers.push(generated_header);
        let preamble = include_lines(&headers)?;

        let amalgamated = work_dir.join(AMALGAMATED_HEADER);
        fs::write(&amalgamated, &preamble)?;
        let cdef = preprocessor.preprocess_file(&amalgamated, &macros)?;
        echo!(verbose, "Interface declaration for '{}':\n{}", unit.name(), cdef);

        let declaration = InterfaceDeclaration::parse(&cdef).map_err(|e| e.into_error(&cdef))?;
        let shim = generate_shim(&preamble, &declaration);

        let mut sources = unit
            .source_files()
            .iter()
            .map(|s| fs::canonicalize(s).map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;
        sources.push(generated_source);

        let unit_fingerprint = unit.fingerprint()?;
        let mut inputs = Fingerprinter::new();
        inputs
            .update(unit_fingerprint.as_str())
            .update(self.synthesizer.name())
            .update(&cdef);
        let fingerprint = inputs.finish();
        let request = BuildRequest {
            name: unit.name(),
            work_dir: &work_dir,
            shim: &shim,
            sources: &sources,
            compiler_flags: unit.compiler_flags(),
            macros: &macros,
            fingerprint: &fingerprint,
        };
        echo!(
            verbose,
            "Building '{}': sources {:?}, flags {:?}, macros {:?}",
            unit.name(),
            sources,
            unit.compiler_flags(),
            unit.macros()
        );

        let builder = NativeBuilder::new(compiler).with_extra_args(self.config.toolchain.extra_build_args.clone());
        let built = builder.build(&request)?;
        info!("Built {:?}", built.path);

        let library = LoadedLibrary::open(&built.path)?;
        write_build_record(&work_dir, unit_fingerprint, &built.path, cdef)?;
        Ok(ModuleProxy::new(unit.name(), library, declaration))
    }

    /// Load the library left by the unit's last successful finalize. No
    /// external tool runs.
    ///
    /// Fails with [`Error::NotBuilt`] when there is no recorded build, its
    /// library is gone, or the unit changed since it was built.
    pub fn load(&self, unit: &BuildUnit) -> Result<ModuleProxy> {
        unit.validate()?;
        let work_dir = unit.work_dir();
        let not_built = |reason: String| Error::NotBuilt {
            unit: unit.name().to_string(),
            reason,
        };

        let record: BuildRecord = match fs::read(work_dir.join(BUILD_RECORD)) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(not_built(format!("no build recorded in {:?}", work_dir)));
            }
            Err(e) => return Err(e.into()),
        };

        if record.unit != unit.fingerprint()? {
            return Err(not_built("the unit changed since its last build".to_string()));
        }

        let library_path = work_dir.join(&record.library);
        if !library_path.is_file() {
            return Err(not_built(format!("library {:?} is missing", library_path)));
        }

        let declaration = InterfaceDeclaration::parse(&record.cdef).map_err(|e| e.into_error(&record.cdef))?;
        let library = LoadedLibrary::open(&library_path)?;
        info!("Loaded '{}' from {:?}", unit.name(), library_path);
        Ok(ModuleProxy::new(unit.name(), library, declaration))
    }

    /// Header text for the unit, synthesized when only source text is given
    fn resolve_header(
        &self,
        unit: &BuildUnit,
        work_dir: &Path,
        preprocessor: &SystemPreprocessor,
        macros: &[MacroDefinition],
    ) -> Result<String> {
        let scratch = work_dir.join(PREPROCESS_INPUT);

        let mut header_text = unit.header_text().to_string();
        if unit.has_source_text() && !unit.has_header_text() {
            fs::write(&scratch, strip_includes(unit.source_text()))?;
            let expanded = preprocessor.preprocess_file(&scratch, macros)?;

            header_text = match self.synthesizer.synthesize(&expanded) {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "Declaration synthesis ({}) failed for '{}', continuing with an empty header: {}",
                        self.synthesizer.name(),
                        unit.name(),
                        e
                    );
                    String::new()
                }
            };
            echo!(unit.verbose(), "Synthesized header for '{}':\n{}", unit.name(), header_text);
        }

        if header_text.trim().is_empty() {
            return Ok(String::new());
        }

        fs::write(&scratch, &header_text)?;
        Ok(preprocessor.preprocess_file(&scratch, macros)?)
    }
}

/// `#include "<absolute path>"` for every header, in order
fn include_lines(headers: &[PathBuf]) -> Result<String> {
    let lines = headers
        .iter()
        .map(|h| Ok(format!("#include \"{}\"", fs::canonicalize(h)?.display())))
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

fn write_build_record(work_dir: &Path, unit: Fingerprint, library: &Path, cdef: String) -> Result<()> {
    let record = BuildRecord {
        unit,
        library: library
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        cdef,
    };
    fs::write(work_dir.join(BUILD_RECORD), serde_json::to_vec_pretty(&record)?)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
