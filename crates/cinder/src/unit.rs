//! Build units
//!
//! A [`BuildUnit`] is the frozen description of one shared library: its
//! sources, headers, macros and flags. Units are assembled with the fluent
//! [`UnitBuilder`] and never change afterwards.

use cinder_core::{Error, Fingerprint, Fingerprinter, Result};
use cinder_parser::MacroDefinition;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::pipeline::Pipeline;
use crate::proxy::ModuleProxy;

/// Immutable description of one library build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildUnit {
    name: String,
    source_folder: PathBuf,
    source_files: Vec<PathBuf>,
    header_files: Vec<PathBuf>,
    source_text: String,
    header_text: String,
    macros: Vec<String>,
    compiler_flags: Vec<String>,
    gen_root: PathBuf,
    #[serde(skip)]
    verbose: bool,
}

impl BuildUnit {
    fn new(name: &str, gen_root: PathBuf, verbose: bool) -> Self {
        Self {
            name: name.to_string(),
            source_folder: PathBuf::from("."),
            source_files: Vec::new(),
            header_files: Vec::new(),
            source_text: String::new(),
            header_text: String::new(),
            macros: Vec::new(),
            compiler_flags: Vec::new(),
            gen_root,
            verbose,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_folder(&self) -> &Path {
        &self.source_folder
    }

    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    pub fn header_files(&self) -> &[PathBuf] {
        &self.header_files
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn header_text(&self) -> &str {
        &self.header_text
    }

    pub fn macros(&self) -> &[String] {
        &self.macros
    }

    pub fn compiler_flags(&self) -> &[String] {
        &self.compiler_flags
    }

    pub fn gen_root(&self) -> &Path {
        &self.gen_root
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// `<gen_root>/<name>`
    pub fn work_dir(&self) -> PathBuf {
        self.gen_root.join(&self.name)
    }

    pub fn has_source_text(&self) -> bool {
        !self.source_text.trim().is_empty()
    }

    pub fn has_header_text(&self) -> bool {
        !self.header_text.trim().is_empty()
    }

    /// Check the unit before any tool runs, returning its parsed macros
    pub fn validate(&self) -> Result<Vec<MacroDefinition>> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(Error::Configuration(format!("invalid unit name {:?}", self.name)));
        }

        if self.source_files.is_empty() && !self.has_source_text() {
            return Err(Error::Configuration(format!(
                "unit '{}' has no source files or source text",
                self.name
            )));
        }

        if !self.source_files.is_empty() && self.header_files.is_empty() && !self.has_header_text() {
            return Err(Error::Configuration(format!(
                "unit '{}' has source files but no header files or header text",
                self.name
            )));
        }

        for file in self.source_files.iter().chain(&self.header_files) {
            if !file.is_file() {
                return Err(Error::Configuration(format!(
                    "unit '{}' references missing file {:?}",
                    self.name, file
                )));
            }
        }

        MacroDefinition::parse_all(&self.macros).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Content fingerprint: the unit itself plus every referenced file
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let mut fingerprinter = Fingerprinter::new();
        fingerprinter.update(serde_json::to_vec(self)?);
        for file in self.source_files.iter().chain(&self.header_files) {
            fingerprinter.update_file(file);
        }
        Ok(fingerprinter.finish())
    }
}

/// Fluent builder for a [`BuildUnit`].
///
/// Every method consumes and returns the builder. Relative file paths are
/// joined against the source folder current at the time they are added.
///
/// ```ignore
/// let module = pipeline
///     .unit("add2")
///     .add_source_text("int add2(int a, int b) { return a + b; }")
///     .finalize()?;
/// ```
#[must_use]
pub struct UnitBuilder<'p> {
    pipeline: &'p Pipeline,
    unit: BuildUnit,
}

impl<'p> UnitBuilder<'p> {
    pub(crate) fn new(pipeline: &'p Pipeline, name: &str) -> Self {
        let config = pipeline.config();
        Self {
            pipeline,
            unit: BuildUnit::new(name, config.generation.gen_root.clone(), config.verbose),
        }
    }

    fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.unit.source_folder.join(path)
    }

    pub fn set_source_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.unit.source_folder = folder.into();
        self
    }

    /// Use the folder of `file`'s canonical location
    pub fn set_source_folder_from(self, file: impl AsRef<Path>) -> Self {
        let file = file.as_ref();
        let canonical = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
        let folder = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.set_source_folder(folder)
    }

    /// Generation root; the unit works in `<root>/<name>`
    pub fn set_gen_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.unit.gen_root = root.into();
        self
    }

    pub fn add_header_file(mut self, path: impl AsRef<Path>) -> Self {
        let path = self.resolve(path);
        self.unit.header_files.push(path);
        self
    }

    pub fn add_header_files<I, P>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().fold(self, |builder, path| builder.add_header_file(path))
    }

    pub fn add_header_text(mut self, text: &str) -> Self {
        self.unit.header_text.push('\n');
        self.unit.header_text.push_str(text);
        self
    }

    pub fn add_source_file(mut self, path: impl AsRef<Path>) -> Self {
        let path = self.resolve(path);
        self.unit.source_files.push(path);
        self
    }

    pub fn add_source_files<I, P>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().fold(self, |builder, path| builder.add_source_file(path))
    }

    pub fn add_source_text(mut self, text: &str) -> Self {
        self.unit.source_text.push('\n');
        self.unit.source_text.push_str(text);
        self
    }

    /// `NAME`, `NAME=VALUE` or `NAME(args)=BODY`
    pub fn add_macro(mut self, token: &str) -> Self {
        self.unit.macros.push(token.to_string());
        self
    }

    pub fn add_macros<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens.into_iter().fold(self, |builder, token| builder.add_macro(token.as_ref()))
    }

    pub fn add_macro_if(self, predicate: bool, token: &str) -> Self {
        if predicate {
            self.add_macro(token)
        } else {
            self
        }
    }

    /// Raw compiler flag, passed through unchanged
    pub fn add_compiler_flag(mut self, flag: &str) -> Self {
        self.unit.compiler_flags.push(flag.to_string());
        self
    }

    /// `-Wno-<warning>`
    pub fn suppress_warning(self, warning: &str) -> Self {
        self.add_compiler_flag(&format!("-Wno-{}", warning))
    }

    /// `-save-temps=obj`
    pub fn save_compiler_temps(self) -> Self {
        self.add_compiler_flag("-save-temps=obj")
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.unit.verbose = verbose;
        self
    }

    /// Freeze the configuration
    pub fn build(self) -> BuildUnit {
        self.unit
    }

    /// Freeze the configuration and run the pipeline on it
    pub fn finalize(self) -> Result<ModuleProxy> {
        let pipeline = self.pipeline;
        pipeline.finalize(&self.build())
    }

    /// Freeze the configuration and load its last build without rebuilding
    pub fn load(self) -> Result<ModuleProxy> {
        let pipeline = self.pipeline;
        pipeline.load(&self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::Config;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn pipeline(gen_root: &Path) -> Pipeline {
        let mut config = Config::default();
        config.generation.gen_root = gen_root.to_path_buf();
        Pipeline::new(config)
    }

    #[test]
    fn test_text_fragments_accumulate() {
        let temp = TempDir::new().unwrap();
        let unit = pipeline(temp.path())
            .unit("frag")
            .add_source_text("int a;")
            .add_source_text("int b;")
            .add_header_text("extern int a;")
            .build();

        assert_eq!(unit.source_text(), "\nint a;\nint b;");
        assert_eq!(unit.header_text(), "\nextern int a;");
        assert_eq!(unit.work_dir(), temp.path().join("frag"));
    }

    #[test]
    fn test_paths_use_folder_at_time_of_add() {
        let temp = TempDir::new().unwrap();
        let unit = pipeline(temp.path())
            .unit("paths")
            .add_source_file("a.c")
            .set_source_folder("/src")
            .add_source_files(["b.c", "c.c"])
            .add_header_files(vec!["x.h"])
            .build();

        assert_eq!(
            unit.source_files(),
            &[PathBuf::from("./a.c"), PathBuf::from("/src/b.c"), PathBuf::from("/src/c.c")]
        );
        assert_eq!(unit.header_files(), &[PathBuf::from("/src/x.h")]);
    }

    #[test]
    fn test_source_folder_from_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("lib.c");
        std::fs::write(&file, "").unwrap();

        let unit = pipeline(temp.path()).unit("from").set_source_folder_from(&file).build();

        assert_eq!(unit.source_folder(), std::fs::canonicalize(temp.path()).unwrap());
    }

    #[test]
    fn test_flags_and_macros_keep_order() {
        let temp = TempDir::new().unwrap();
        let unit = pipeline(temp.path())
            .unit("flags")
            .add_source_text("int x;")
            .add_macro("A=1")
            .add_macro_if(false, "SKIPPED")
            .add_macros(["B", "A=2"])
            .add_macro_if(true, "DEBUG")
            .suppress_warning("sign-compare")
            .save_compiler_temps()
            .add_compiler_flag("-O2")
            .build();

        assert_eq!(unit.macros(), &["A=1", "B", "A=2", "DEBUG"]);
        assert_eq!(unit.compiler_flags(), &["-Wno-sign-compare", "-save-temps=obj", "-O2"]);
        assert_eq!(unit.validate().unwrap().len(), 4);
    }

    #[test]
    fn test_validation() {
        let temp = TempDir::new().unwrap();
        let pipeline = pipeline(temp.path());

        let empty = pipeline.unit("empty").build();
        assert!(matches!(empty.validate(), Err(Error::Configuration(_))));

        let blank = pipeline.unit("blank").add_source_text("  \n").build();
        assert!(matches!(blank.validate(), Err(Error::Configuration(_))));

        let source = temp.path().join("s.c");
        std::fs::write(&source, "int s(void) { return 1; }").unwrap();
        let headerless = pipeline.unit("headerless").add_source_file(&source).build();
        assert!(matches!(headerless.validate(), Err(Error::Configuration(_))));

        let with_text = pipeline
            .unit("with_text")
            .add_source_file(&source)
            .add_header_text("int s(void);")
            .build();
        assert!(with_text.validate().is_ok());

        let missing = pipeline
            .unit("missing")
            .add_source_file(temp.path().join("nope.c"))
            .add_header_text("int s(void);")
            .build();
        assert!(matches!(missing.validate(), Err(Error::Configuration(_))));

        let bad_macro = pipeline.unit("bad_macro").add_source_text("int x;").add_macro("1BAD").build();
        assert!(matches!(bad_macro.validate(), Err(Error::Configuration(_))));

        let bad_name = pipeline.unit("../escape").add_source_text("int x;").build();
        assert!(matches!(bad_name.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let temp = TempDir::new().unwrap();
        let pipeline = pipeline(temp.path());
        let header = temp.path().join("f.h");
        std::fs::write(&header, "int f(void);").unwrap();

        let unit = |text: &str| {
            pipeline
                .unit("fp")
                .add_header_file(&header)
                .add_source_text(text)
                .build()
        };

        let a = unit("int f(void) { return 1; }").fingerprint().unwrap();
        let b = unit("int f(void) { return 1; }").fingerprint().unwrap();
        let c = unit("int f(void) { return 2; }").fingerprint().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        std::fs::write(&header, "int f(void); int g(void);").unwrap();
        let d = unit("int f(void) { return 1; }").fingerprint().unwrap();
        assert_ne!(a, d);

        let verbose = pipeline
            .unit("fp")
            .add_header_file(&header)
            .add_source_text("int f(void) { return 1; }")
            .verbose(true)
            .build();
        assert_eq!(verbose.fingerprint().unwrap(), d);
    }
}
